//! Task submission — validate, persist, and queue a profiling request.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::{Error, Result, TaskError};
use crate::profiler::SelectProfiler;
use crate::scheduler::{JobPayload, JobScheduler};
use crate::store::TaskRepository;
use crate::task::{Task, TaskId, TaskRequest, TaskType};

/// Front door for new tasks.
///
/// A submission is accepted only if it can plausibly execute: the task type
/// must be `profile` and the selection policy must resolve a profiler for the
/// language/mode pair. Both checks run before anything is persisted, so a
/// rejected submission leaves no task row and no job behind.
pub struct TaskSubmission {
    repository: Arc<dyn TaskRepository>,
    scheduler: Arc<JobScheduler>,
    selector: Arc<dyn SelectProfiler>,
    schedule_delay: Duration,
}

impl TaskSubmission {
    pub fn new(
        repository: Arc<dyn TaskRepository>,
        scheduler: Arc<JobScheduler>,
        selector: Arc<dyn SelectProfiler>,
        schedule_delay: Duration,
    ) -> Self {
        Self {
            repository,
            scheduler,
            selector,
            schedule_delay,
        }
    }

    /// Accept a request: persist a PENDING task, durably queue its job, and
    /// return the task immediately. Execution happens later, off this path.
    pub async fn submit(&self, request: TaskRequest) -> Result<Task> {
        if request.task_type != TaskType::Profile {
            return Err(TaskError::UnsupportedTaskType(request.task_type.to_string()).into());
        }

        // Fail fast on requests no profiler can serve.
        self.selector
            .select(&request.language, request.profiling_mode)
            .map_err(Error::from)?;

        let mut task = self.repository.save_task(&request).await?;

        let due_time = Utc::now()
            + chrono::Duration::from_std(self.schedule_delay)
                .unwrap_or_else(|_| chrono::Duration::zero());
        let payload = JobPayload {
            task_id: task.id.as_str().to_string(),
            request,
        };
        let job_id = match self.scheduler.schedule(due_time, &payload).await {
            Ok(job_id) => job_id,
            Err(e) => {
                // The task exists but has no job and can never run; record
                // that instead of stranding a PENDING row.
                task.fail(e.to_string());
                if let Err(store_err) = self.repository.update_task(&task).await {
                    warn!(task_id = %task.id, error = %store_err, "Failed to record scheduling failure");
                }
                return Err(e.into());
            }
        };

        task.job_ref = Some(job_id);
        let task = self.repository.update_task(&task).await?;

        info!(task_id = %task.id, language = %task.language, "Task accepted");
        Ok(task)
    }

    /// Look up a task by id.
    pub async fn lookup(&self, id: &TaskId) -> Result<Task> {
        self.repository
            .get_task(id)
            .await?
            .ok_or_else(|| TaskError::NotFound(id.to_string()).into())
    }
}
