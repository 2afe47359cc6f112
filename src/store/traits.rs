//! Persistence contracts — the only shared mutable state in the service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::task::{Task, TaskId, TaskRequest};

/// Durable store for task entities, keyed by opaque id.
///
/// Tasks are owned by the repository: workers and the request path both
/// mutate them exclusively through `update_task`, which must be row-scoped so
/// concurrent updates to unrelated tasks never lose writes.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Create a task in `Pending` with a generated id and persist it.
    async fn save_task(&self, request: &TaskRequest) -> Result<Task, DatabaseError>;

    /// Look up a task by id.
    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, DatabaseError>;

    /// Persist the full task state, refreshing `updated_at`. Returns the
    /// task as persisted.
    async fn update_task(&self, task: &Task) -> Result<Task, DatabaseError>;
}

/// Durable record of scheduled future work.
///
/// The payload is an opaque serialized blob (task id + original request),
/// reconstructible by a worker in another process after a restart.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub job_id: String,
    pub due_time: DateTime<Utc>,
    pub payload: String,
}

/// Durable store for scheduled jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a job synchronously. Once this returns, the work is durably
    /// queued and survives a process restart.
    async fn insert_job(&self, job: &JobRecord) -> Result<(), DatabaseError>;

    /// All jobs whose due time is at or before `now`, oldest first.
    async fn due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<JobRecord>, DatabaseError>;

    /// Remove a job, returning whether a row was actually deleted.
    ///
    /// This is the claim operation: the dispatcher only executes a job it
    /// removed itself, so a job can never fire twice.
    async fn remove_job(&self, job_id: &str) -> Result<bool, DatabaseError>;

    /// Look up a job by id.
    async fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>, DatabaseError>;
}
