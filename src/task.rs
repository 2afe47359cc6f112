//! Task domain model — identifiers, runtime options, and the state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TaskError;

/// Opaque, non-empty task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Construct a task id, rejecting empty strings.
    pub fn new(value: impl Into<String>) -> Result<Self, TaskError> {
        let value = value.into();
        if value.is_empty() {
            return Err(TaskError::InvalidIdentifier(
                "task id cannot be empty".to_string(),
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the caller wants done with the uploaded program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Profile,
    Optimize,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Profile => "profile",
            TaskType::Optimize => "optimize",
        }
    }
}

impl std::str::FromStr for TaskType {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "profile" => Ok(TaskType::Profile),
            "optimize" => Ok(TaskType::Optimize),
            other => Err(TaskError::UnsupportedTaskType(other.to_string())),
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Programming language of the uploaded source, normalized to lowercase.
///
/// Deliberately an open set: concrete strategies exist for `python` and `c`,
/// and the LLM strategy accepts anything. Whether a language is actually
/// supported is decided by the selection policy, not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Language(String);

impl Language {
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(value.as_ref().trim().to_ascii_lowercase())
    }

    pub fn python() -> Self {
        Self("python".to_string())
    }

    pub fn c() -> Self {
        Self("c".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a task.
///
/// `Pending → Running → {Completed, Failed}`. Terminal states never regress;
/// the transition helpers on [`Task`] enforce this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "running" => Some(TaskStatus::Running),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the program should be profiled. Orthogonal to language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfilingMode {
    /// Language-specific instrumented run only.
    Classical,
    /// LLM static analysis only.
    Llm,
    /// Classical strategy layered over the LLM strategy's output.
    Augmented,
}

impl ProfilingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfilingMode::Classical => "classical",
            ProfilingMode::Llm => "llm",
            ProfilingMode::Augmented => "augmented",
        }
    }
}

impl std::str::FromStr for ProfilingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classical" => Ok(ProfilingMode::Classical),
            "llm" => Ok(ProfilingMode::Llm),
            "augmented" => Ok(ProfilingMode::Augmented),
            other => Err(format!("unknown profiling mode '{other}'")),
        }
    }
}

impl std::fmt::Display for ProfilingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameterization of how the program is built and run.
///
/// Every field is independently optional; absence means "use the strategy
/// default". The `compilation_*` set applies to the build phase of languages
/// with a separate build step, the rest to the run phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub envs: Option<std::collections::BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_memory_mb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compilation_args: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compilation_envs: Option<std::collections::BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compilation_cwd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compilation_timeout_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compilation_max_memory_mb: Option<u64>,
}

/// Terminal outcome of a task. `error` is set iff the task failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub artifact_path: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl TaskResult {
    pub fn success(artifact_path: impl Into<String>) -> Self {
        Self {
            artifact_path: artifact_path.into(),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            artifact_path: String::new(),
            error: Some(error.into()),
        }
    }
}

/// A submitted profiling request, before it becomes a persisted task.
///
/// Also serialized verbatim into the durable job payload, so a worker in a
/// different process can reconstruct the work from the job store alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    pub task_type: TaskType,
    pub language: Language,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub runtime_options: Option<RuntimeOptions>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub profiling_mode: Option<ProfilingMode>,
    pub source_path: String,
}

/// The durable unit the caller tracks. Owned by the task repository and
/// mutated only through its `update` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub task_type: TaskType,
    pub language: Language,
    pub runtime_options: Option<RuntimeOptions>,
    pub source_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub result: Option<TaskResult>,
    /// Opaque handle to the scheduled job. Stored for cancellation/lookup;
    /// cancellation itself is not implemented.
    pub job_ref: Option<String>,
}

impl Task {
    /// Transition `Pending → Running`. Returns false (and leaves the task
    /// untouched) from any other state.
    pub fn begin(&mut self) -> bool {
        if self.status != TaskStatus::Pending {
            return false;
        }
        self.status = TaskStatus::Running;
        true
    }

    /// Transition to `Completed` with a result artifact. No-op once terminal.
    pub fn complete(&mut self, artifact_path: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = TaskStatus::Completed;
        self.result = Some(TaskResult::success(artifact_path));
        true
    }

    /// Transition to `Failed`, preserving the error message verbatim.
    /// No-op once terminal.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = TaskStatus::Failed;
        self.result = Some(TaskResult::failure(error));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task() -> Task {
        Task {
            id: TaskId::new("t1").unwrap(),
            task_type: TaskType::Profile,
            language: Language::python(),
            runtime_options: None,
            source_path: "/tmp/main.py".to_string(),
            created_at: Utc::now(),
            updated_at: None,
            status: TaskStatus::Pending,
            result: None,
            job_ref: None,
        }
    }

    #[test]
    fn empty_task_id_is_rejected() {
        assert!(matches!(
            TaskId::new(""),
            Err(TaskError::InvalidIdentifier(_))
        ));
        assert!(TaskId::new("abc").is_ok());
    }

    #[test]
    fn language_is_normalized() {
        assert_eq!(Language::new(" Python ").as_str(), "python");
        assert_eq!(Language::new("C"), Language::c());
    }

    #[test]
    fn state_machine_is_monotone() {
        let mut task = sample_task();
        assert!(task.begin());
        assert_eq!(task.status, TaskStatus::Running);

        assert!(task.complete("/tmp/report.txt"));
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.result.as_ref().unwrap().error, None);

        // Terminal states never regress.
        assert!(!task.begin());
        assert!(!task.fail("late failure"));
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[test]
    fn failure_preserves_error_message() {
        let mut task = sample_task();
        task.begin();
        assert!(task.fail("gcc: error: something broke"));
        let result = task.result.unwrap();
        assert_eq!(result.artifact_path, "");
        assert_eq!(result.error.as_deref(), Some("gcc: error: something broke"));
    }

    #[test]
    fn begin_requires_pending() {
        let mut task = sample_task();
        task.status = TaskStatus::Running;
        assert!(!task.begin());
    }

    #[test]
    fn runtime_options_round_trip() {
        let opts = RuntimeOptions {
            command: Some("python3".into()),
            args: Some(vec!["input.txt".into()]),
            envs: Some(
                [("DB_HOST".to_string(), "localhost".to_string())]
                    .into_iter()
                    .collect(),
            ),
            cwd: Some("/tmp".into()),
            timeout_seconds: Some(30),
            max_memory_mb: Some(256),
            compilation_args: Some(vec!["-O2".into()]),
            compilation_envs: None,
            compilation_cwd: None,
            compilation_timeout_seconds: Some(60),
            compilation_max_memory_mb: None,
        };
        let encoded = serde_json::to_string(&opts).unwrap();
        let decoded: RuntimeOptions = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, opts);

        // Wire names are camelCase.
        assert!(encoded.contains("timeoutSeconds"));
        assert!(encoded.contains("compilationArgs"));
    }

    #[test]
    fn task_result_round_trip() {
        for result in [
            TaskResult::success("/tmp/profiling.txt"),
            TaskResult::failure("compile error"),
        ] {
            let encoded = serde_json::to_string(&result).unwrap();
            let decoded: TaskResult = serde_json::from_str(&encoded).unwrap();
            assert_eq!(decoded, result);
        }
    }

    #[test]
    fn task_type_parses() {
        assert_eq!("profile".parse::<TaskType>().unwrap(), TaskType::Profile);
        assert_eq!("Optimize".parse::<TaskType>().unwrap(), TaskType::Optimize);
        assert!(matches!(
            "compile".parse::<TaskType>(),
            Err(TaskError::UnsupportedTaskType(_))
        ));
    }

    #[test]
    fn profiling_mode_parses() {
        assert_eq!(
            "augmented".parse::<ProfilingMode>().unwrap(),
            ProfilingMode::Augmented
        );
        assert!("fast".parse::<ProfilingMode>().is_err());
    }
}
