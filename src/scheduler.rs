//! Durable job scheduling and execution.
//!
//! `JobScheduler::schedule` persists a job synchronously; a dispatch loop
//! polls the job store, claims due jobs by deleting their row (at-most-once
//! firing), and runs each one in its own spawned task under a bounded
//! semaphore. Workers rebuild everything they need from a [`WorkerContext`],
//! which is constructible from the service configuration alone — nothing is
//! captured by reference from the submitting context, so a worker could just
//! as well live in another process.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::{DatabaseError, SchedulerError};
use crate::profiler::{ProfilerSelector, SelectProfiler};
use crate::store::{JobRecord, JobStore, LibSqlBackend, TaskRepository};
use crate::task::{TaskId, TaskRequest};

/// Serialized state of a scheduled job: everything a worker needs to redo
/// the work after a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub task_id: String,
    pub request: TaskRequest,
}

/// Dependencies a worker needs to execute one job.
pub struct WorkerContext {
    pub repository: Arc<dyn TaskRepository>,
    pub selector: Arc<dyn SelectProfiler>,
}

impl WorkerContext {
    pub fn new(repository: Arc<dyn TaskRepository>, selector: Arc<dyn SelectProfiler>) -> Self {
        Self {
            repository,
            selector,
        }
    }

    /// Rebuild the full worker dependency set from configuration, opening a
    /// fresh store connection rather than sharing the submitter's.
    pub async fn from_config(config: &ServerConfig) -> Result<Self, DatabaseError> {
        let backend = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);
        let selector = Arc::new(ProfilerSelector::new(
            config.default_mode,
            config.ollama.clone(),
        ));
        Ok(Self::new(backend, selector))
    }
}

/// Durable, delayed, isolated execution of profiling jobs.
pub struct JobScheduler {
    jobs: Arc<dyn JobStore>,
    ctx: Arc<WorkerContext>,
    limiter: Arc<Semaphore>,
    poll_interval: Duration,
}

impl JobScheduler {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        ctx: Arc<WorkerContext>,
        max_concurrent_jobs: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            jobs,
            ctx,
            limiter: Arc::new(Semaphore::new(max_concurrent_jobs)),
            poll_interval,
        }
    }

    /// Persist a job due at `due_time`. Once this returns, the work is
    /// durably queued and survives a restart.
    pub async fn schedule(
        &self,
        due_time: DateTime<Utc>,
        payload: &JobPayload,
    ) -> Result<String, SchedulerError> {
        let job_id = Uuid::new_v4().to_string();
        let serialized =
            serde_json::to_string(payload).map_err(|e| SchedulerError::Payload(e.to_string()))?;

        self.jobs
            .insert_job(&JobRecord {
                job_id: job_id.clone(),
                due_time,
                payload: serialized,
            })
            .await
            .map_err(|e| SchedulerError::JobScheduling {
                job_id: job_id.clone(),
                reason: e.to_string(),
            })?;

        info!(%job_id, %due_time, task_id = %payload.task_id, "Job scheduled");
        Ok(job_id)
    }

    /// Spawn the background loop that polls for due jobs.
    pub fn spawn_dispatch_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            info!(interval = ?scheduler.poll_interval, "Job dispatch loop started");
            let mut tick = tokio::time::interval(scheduler.poll_interval);
            loop {
                tick.tick().await;
                scheduler.dispatch_due().await;
            }
        })
    }

    /// One dispatch cycle: claim every due job and spawn a worker for it.
    /// Returns the number of jobs dispatched.
    pub async fn dispatch_due(&self) -> usize {
        let due = match self.jobs.due_jobs(Utc::now()).await {
            Ok(due) => due,
            Err(e) => {
                warn!(error = %e, "Failed to poll job store");
                return 0;
            }
        };

        let mut dispatched = 0;
        for job in due {
            let permit = match Arc::clone(&self.limiter).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            // Claim by delete: only the poller that removed the row runs it,
            // so a job never fires twice.
            match self.jobs.remove_job(&job.job_id).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!(job_id = %job.job_id, error = %e, "Failed to claim job");
                    continue;
                }
            }

            let payload: JobPayload = match serde_json::from_str(&job.payload) {
                Ok(payload) => payload,
                Err(e) => {
                    error!(job_id = %job.job_id, error = %e, "Dropping job with undecodable payload");
                    continue;
                }
            };

            debug!(job_id = %job.job_id, task_id = %payload.task_id, "Dispatching job");

            let ctx = Arc::clone(&self.ctx);
            let job_id = job.job_id.clone();
            tokio::spawn(async move {
                // The job body runs in its own task so a panicking strategy
                // cannot take the dispatch loop down with it.
                let worker_ctx = Arc::clone(&ctx);
                let task_id = payload.task_id.clone();
                let worker = tokio::spawn(async move { run_job(&worker_ctx, payload).await });
                if let Err(e) = worker.await {
                    error!(%job_id, error = %e, "Job worker crashed");
                    fail_crashed_task(&ctx, &task_id, &e.to_string()).await;
                }
                drop(permit);
            });
            dispatched += 1;
        }
        dispatched
    }
}

/// Execute one claimed job: resolve the profiler, run it, and drive the task
/// to its terminal state. Every failure path ends in a persisted FAILED task
/// with the message preserved verbatim; this function itself never errors.
pub async fn run_job(ctx: &WorkerContext, payload: JobPayload) {
    let task_id = match TaskId::new(payload.task_id.clone()) {
        Ok(id) => id,
        Err(e) => {
            error!(error = %e, "Job payload carries an invalid task id");
            return;
        }
    };

    let mut task = match ctx.repository.get_task(&task_id).await {
        Ok(Some(task)) => task,
        Ok(None) => {
            warn!(%task_id, "Job fired for a task that no longer exists");
            return;
        }
        Err(e) => {
            error!(%task_id, error = %e, "Failed to load task");
            return;
        }
    };

    if task.status.is_terminal() {
        warn!(%task_id, status = %task.status, "Task already terminal, skipping");
        return;
    }

    // RUNNING is persisted before execution starts, so a crash mid-execution
    // is observable as a task stuck in RUNNING.
    task.begin();
    task = match ctx.repository.update_task(&task).await {
        Ok(task) => task,
        Err(e) => {
            error!(%task_id, error = %e, "Failed to persist RUNNING state, aborting job");
            return;
        }
    };

    let request = &payload.request;
    let profiler = match ctx
        .selector
        .select(&request.language, request.profiling_mode)
    {
        Ok(profiler) => profiler,
        Err(e) => {
            task.fail(e.to_string());
            persist_terminal(ctx, &task).await;
            return;
        }
    };

    info!(%task_id, profiler = %profiler.describe(), source = %request.source_path, "Profiling started");

    let outcome = profiler
        .profile(
            std::path::Path::new(&request.source_path),
            request.runtime_options.as_ref(),
        )
        .await;

    match outcome {
        Ok(artifact) => {
            info!(%task_id, artifact = %artifact.display(), "Profiling completed");
            task.complete(artifact.display().to_string());
        }
        Err(e) => {
            warn!(%task_id, error = %e, "Profiling failed");
            task.fail(e.to_string());
        }
    }

    persist_terminal(ctx, &task).await;
}

/// Persist the terminal state. Store errors here are logged, not retried:
/// the task then stays in its last successfully persisted state.
async fn persist_terminal(ctx: &WorkerContext, task: &crate::task::Task) {
    if let Err(e) = ctx.repository.update_task(task).await {
        error!(task_id = %task.id, error = %e, "Failed to persist terminal task state");
    }
}

/// Best-effort terminal update after a worker panic, so the task does not
/// linger in RUNNING when the strategy itself blew up.
async fn fail_crashed_task(ctx: &WorkerContext, task_id: &str, reason: &str) {
    let Ok(id) = TaskId::new(task_id) else { return };
    if let Ok(Some(mut task)) = ctx.repository.get_task(&id).await {
        if task.fail(format!("profiler crashed: {reason}")) {
            persist_terminal(ctx, &task).await;
        }
    }
}
