//! libSQL backend — async implementation of both persistence traits.
//!
//! Supports local file and in-memory databases. All writes are row-scoped
//! single statements, so concurrent updates from the worker and request
//! paths serialize at the engine without losing writes to unrelated rows.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::debug;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{JobRecord, JobStore, TaskRepository};
use crate::task::{Task, TaskId, TaskRequest, TaskResult, TaskStatus};

/// libSQL database backend.
///
/// Holds a single connection reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path).build().await.map_err(|e| {
            DatabaseError::Connection(format!("Failed to open libSQL database: {e}"))
        })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        tracing::info!(path = %path.display(), "Database opened");

        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;

        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Row mapping helpers ─────────────────────────────────────────────

const TASK_COLUMNS: &str =
    "id, task_type, language, path, created_at, updated_at, status, runtime_options, result, job_ref";

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Serialization(format!("bad timestamp '{s}': {e}")))
}

/// Decode a JSON column into `T`. Round-trip symmetry with the encode side is
/// what keeps stored `runtime_options`/`result` values lossless.
fn decode_json<T: serde::de::DeserializeOwned>(
    column: &str,
    value: Option<String>,
) -> Result<Option<T>, DatabaseError> {
    match value {
        Some(json) => serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| DatabaseError::Serialization(format!("{column}: {e}"))),
        None => Ok(None),
    }
}

fn encode_json<T: serde::Serialize>(
    column: &str,
    value: Option<&T>,
) -> Result<libsql::Value, DatabaseError> {
    match value {
        Some(v) => serde_json::to_string(v)
            .map(libsql::Value::Text)
            .map_err(|e| DatabaseError::Serialization(format!("{column}: {e}"))),
        None => Ok(libsql::Value::Null),
    }
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn row_to_task(row: &libsql::Row) -> Result<Task, DatabaseError> {
    let query_err = |e: libsql::Error| DatabaseError::Query(format!("task row: {e}"));

    let id: String = row.get(0).map_err(query_err)?;
    let task_type: String = row.get(1).map_err(query_err)?;
    let language: String = row.get(2).map_err(query_err)?;
    let path: String = row.get(3).map_err(query_err)?;
    let created_at: String = row.get(4).map_err(query_err)?;
    let updated_at: Option<String> = row.get(5).map_err(query_err)?;
    let status: String = row.get(6).map_err(query_err)?;
    let runtime_options: Option<String> = row.get(7).map_err(query_err)?;
    let result: Option<String> = row.get(8).map_err(query_err)?;
    let job_ref: Option<String> = row.get(9).map_err(query_err)?;

    Ok(Task {
        id: TaskId::new(id).map_err(|e| DatabaseError::Serialization(e.to_string()))?,
        task_type: task_type
            .parse()
            .map_err(|_| DatabaseError::Serialization(format!("bad task_type '{task_type}'")))?,
        language: crate::task::Language::new(&language),
        runtime_options: decode_json("runtime_options", runtime_options)?,
        source_path: path,
        created_at: parse_datetime(&created_at)?,
        updated_at: updated_at.as_deref().map(parse_datetime).transpose()?,
        status: TaskStatus::parse(&status)
            .ok_or_else(|| DatabaseError::Serialization(format!("bad status '{status}'")))?,
        result: decode_json::<TaskResult>("result", result)?,
        job_ref,
    })
}

fn row_to_job(row: &libsql::Row) -> Result<JobRecord, DatabaseError> {
    let query_err = |e: libsql::Error| DatabaseError::Query(format!("job row: {e}"));

    let job_id: String = row.get(0).map_err(query_err)?;
    let due_time: String = row.get(1).map_err(query_err)?;
    let payload: String = row.get(2).map_err(query_err)?;

    Ok(JobRecord {
        job_id,
        due_time: parse_datetime(&due_time)?,
        payload,
    })
}

// ── Trait implementations ───────────────────────────────────────────

#[async_trait]
impl TaskRepository for LibSqlBackend {
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

        self.conn()
            .execute(
                "INSERT INTO tasks (id, task_type, language, path, created_at, updated_at, status, runtime_options, result, job_ref) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    task.id.as_str(),
                    task.task_type.as_str(),
                    task.language.as_str(),
                    task.source_path.as_str(),
                    task.created_at.to_rfc3339(),
                    libsql::Value::Null,
                    task.status.as_str(),
                    encode_json("runtime_options", task.runtime_options.as_ref())?,
                    libsql::Value::Null,
                    libsql::Value::Null,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_task: {e}")))?;

        debug!(task_id = %task.id, "Task persisted");
        Ok(task)
    }

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_task: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_task(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_task: {e}"))),
        }
    }

    async fn update_task(&self, task: &Task) -> Result<Task, DatabaseError> {
        let mut updated = task.clone();
        updated.updated_at = Some(Utc::now());

        self.conn()
            .execute(
                "UPDATE tasks SET status = ?1, updated_at = ?2, runtime_options = ?3, result = ?4, job_ref = ?5 WHERE id = ?6",
                params![
                    updated.status.as_str(),
                    updated.updated_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
                    encode_json("runtime_options", updated.runtime_options.as_ref())?,
                    encode_json("result", updated.result.as_ref())?,
                    opt_text(updated.job_ref.as_deref()),
                    updated.id.as_str(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_task: {e}")))?;

        debug!(task_id = %updated.id, status = %updated.status, "Task updated");
        Ok(updated)
    }
}

#[async_trait]
impl JobStore for LibSqlBackend {
    async fn insert_job(&self, job: &JobRecord) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO jobs (job_id, due_time, payload) VALUES (?1, ?2, ?3)",
                params![
                    job.job_id.as_str(),
                    job.due_time.to_rfc3339(),
                    job.payload.as_str(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_job: {e}")))?;

        debug!(job_id = %job.job_id, due_time = %job.due_time, "Job persisted");
        Ok(())
    }

    async fn due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<JobRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT job_id, due_time, payload FROM jobs WHERE due_time <= ?1 ORDER BY due_time ASC",
                params![now.to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("due_jobs: {e}")))?;

        let mut jobs = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_job(&row) {
                Ok(job) => jobs.push(job),
                Err(e) => tracing::warn!("Skipping job row: {e}"),
            }
        }
        Ok(jobs)
    }

    async fn remove_job(&self, job_id: &str) -> Result<bool, DatabaseError> {
        let deleted = self
            .conn()
            .execute("DELETE FROM jobs WHERE job_id = ?1", params![job_id])
            .await
            .map_err(|e| DatabaseError::Query(format!("remove_job: {e}")))?;

        Ok(deleted > 0)
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT job_id, due_time, payload FROM jobs WHERE job_id = ?1",
                params![job_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_job: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_job(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_job: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Language, ProfilingMode, RuntimeOptions, TaskType};

    fn sample_request() -> TaskRequest {
        TaskRequest {
            task_type: TaskType::Profile,
            language: Language::python(),
            runtime_options: Some(RuntimeOptions {
                args: Some(vec!["input.txt".into()]),
                timeout_seconds: Some(30),
                ..Default::default()
            }),
            profiling_mode: Some(ProfilingMode::Classical),
            source_path: "/tmp/files/abc/main.py".to_string(),
        }
    }

    #[tokio::test]
    async fn save_creates_pending_task() {
        let backend = LibSqlBackend::new_memory().await.unwrap();
        let task = backend.save_task(&sample_request()).await.unwrap();

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.updated_at, None);
        assert!(task.result.is_none());
        assert!(!task.id.as_str().is_empty());
    }

    #[tokio::test]
    async fn get_task_round_trips_polymorphic_fields() {
        let backend = LibSqlBackend::new_memory().await.unwrap();
        let request = sample_request();
        let saved = backend.save_task(&request).await.unwrap();

        let fetched = backend.get_task(&saved.id).await.unwrap().unwrap();
        assert_eq!(fetched.runtime_options, request.runtime_options);
        assert_eq!(fetched.language, request.language);
        assert_eq!(fetched.source_path, request.source_path);
        assert_eq!(fetched.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn get_missing_task_is_none() {
        let backend = LibSqlBackend::new_memory().await.unwrap();
        let id = TaskId::new("nope").unwrap();
        assert!(backend.get_task(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_refreshes_updated_at_and_persists_result() {
        let backend = LibSqlBackend::new_memory().await.unwrap();
        let mut task = backend.save_task(&sample_request()).await.unwrap();

        task.begin();
        let running = backend.update_task(&task).await.unwrap();
        assert!(running.updated_at.is_some());

        let mut task = running;
        task.complete("/tmp/profiling.txt");
        backend.update_task(&task).await.unwrap();

        let fetched = backend.get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, TaskStatus::Completed);
        let result = fetched.result.unwrap();
        assert_eq!(result.artifact_path, "/tmp/profiling.txt");
        assert_eq!(result.error, None);
    }

    #[tokio::test]
    async fn update_is_row_scoped() {
        let backend = LibSqlBackend::new_memory().await.unwrap();
        let a = backend.save_task(&sample_request()).await.unwrap();
        let mut b = backend.save_task(&sample_request()).await.unwrap();

        b.begin();
        b.fail("boom");
        backend.update_task(&b).await.unwrap();

        // Updating b must not touch a.
        let a_after = backend.get_task(&a.id).await.unwrap().unwrap();
        assert_eq!(a_after.status, TaskStatus::Pending);
        assert!(a_after.result.is_none());
    }

    #[tokio::test]
    async fn jobs_insert_due_remove() {
        let backend = LibSqlBackend::new_memory().await.unwrap();
        let now = Utc::now();

        let due = JobRecord {
            job_id: "j1".into(),
            due_time: now - chrono::Duration::seconds(5),
            payload: "{}".into(),
        };
        let future = JobRecord {
            job_id: "j2".into(),
            due_time: now + chrono::Duration::hours(1),
            payload: "{}".into(),
        };
        backend.insert_job(&due).await.unwrap();
        backend.insert_job(&future).await.unwrap();

        let due_now = backend.due_jobs(now).await.unwrap();
        assert_eq!(due_now.len(), 1);
        assert_eq!(due_now[0].job_id, "j1");

        // First removal claims the job; the second sees nothing.
        assert!(backend.remove_job("j1").await.unwrap());
        assert!(!backend.remove_job("j1").await.unwrap());
        assert!(backend.due_jobs(now).await.unwrap().is_empty());

        // The future job is still durably queued.
        assert!(backend.get_job("j2").await.unwrap().is_some());
    }
}
