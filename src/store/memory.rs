//! In-memory implementations of the persistence traits.
//!
//! Not durable; used by tests and useful as a reference implementation of
//! the repository contracts.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::traits::{JobRecord, JobStore, TaskRepository};
use crate::task::{Task, TaskId, TaskRequest, TaskStatus};

/// Task repository backed by a map.
#[derive(Default)]
pub struct InMemoryTaskRepository {
    tasks: Arc<RwLock<HashMap<String, Task>>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tasks.
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }

    /// Snapshot of all stored tasks, in no particular order.
    pub async fn tasks(&self) -> Vec<Task> {
        self.tasks.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn save_task(&self, request: &TaskRequest) -> Result<Task, DatabaseError> {
        let task = Task {
            id: TaskId::new(Uuid::new_v4().to_string())
                .map_err(|e| DatabaseError::Serialization(e.to_string()))?,
            task_type: request.task_type,
            language: request.language.clone(),
            runtime_options: request.runtime_options.clone(),
            source_path: request.source_path.clone(),
            created_at: Utc::now(),
            updated_at: None,
            status: TaskStatus::Pending,
            result: None,
            job_ref: None,
        };

        self.tasks
            .write()
            .await
            .insert(task.id.as_str().to_string(), task.clone());
        Ok(task)
    }

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, DatabaseError> {
        Ok(self.tasks.read().await.get(id.as_str()).cloned())
    }

    async fn update_task(&self, task: &Task) -> Result<Task, DatabaseError> {
        let mut updated = task.clone();
        updated.updated_at = Some(Utc::now());
        self.tasks
            .write()
            .await
            .insert(updated.id.as_str().to_string(), updated.clone());
        Ok(updated)
    }
}

/// Job store backed by a map.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Arc<RwLock<HashMap<String, JobRecord>>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert_job(&self, job: &JobRecord) -> Result<(), DatabaseError> {
        self.jobs
            .write()
            .await
            .insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    async fn due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<JobRecord>, DatabaseError> {
        let jobs = self.jobs.read().await;
        let mut due: Vec<JobRecord> = jobs
            .values()
            .filter(|j| j.due_time <= now)
            .cloned()
            .collect();
        due.sort_by_key(|j| j.due_time);
        Ok(due)
    }

    async fn remove_job(&self, job_id: &str) -> Result<bool, DatabaseError> {
        Ok(self.jobs.write().await.remove(job_id).is_some())
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>, DatabaseError> {
        Ok(self.jobs.read().await.get(job_id).cloned())
    }
}
