//! REST surface: task submission and status lookup.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, TaskError};
use crate::files::FileStore;
use crate::submit::TaskSubmission;
use crate::task::{
    Language, ProfilingMode, RuntimeOptions, Task, TaskId, TaskRequest, TaskResult, TaskStatus,
    TaskType,
};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub submission: Arc<TaskSubmission>,
    pub files: Arc<FileStore>,
}

pub fn task_routes(state: AppState) -> Router {
    Router::new()
        .route("/tasks", post(create_task))
        .route("/tasks/{id}", get(get_task))
        .with_state(state)
}

/// Wire representation of a task.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub task_id: String,
    pub task_status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub task_result: Option<TaskResult>,
}

impl From<Task> for TaskResponse {
    fn from(task: Task) -> Self {
        Self {
            task_id: task.id.to_string(),
            task_status: task.status,
            task_result: task.result,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Error type for handlers; maps domain errors onto status codes.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::Task(TaskError::NotFound(_)) => StatusCode::NOT_FOUND,
            Error::Task(_) => StatusCode::BAD_REQUEST,
            Error::Database(_) | Error::Scheduler(_) | Error::Execution(_) | Error::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            warn!(error = %err, "Request failed");
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        Error::from(err).into()
    }
}

/// Decoded multipart submission.
struct SubmissionForm {
    task_type: TaskType,
    language: Language,
    profiling_mode: Option<ProfilingMode>,
    runtime_options: Option<RuntimeOptions>,
    file_name: String,
    content: Vec<u8>,
}

async fn parse_form(mut multipart: Multipart) -> Result<SubmissionForm, ApiError> {
    let mut task_type = None;
    let mut language = None;
    let mut profiling_mode = None;
    let mut runtime_options = None;
    let mut file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "task_type" => {
                let value = read_text(field).await?;
                task_type = Some(
                    TaskType::from_str(&value).map_err(|e| ApiError::bad_request(e.to_string()))?,
                );
            }
            "language" => {
                language = Some(Language::new(read_text(field).await?));
            }
            "profiling_type" => {
                let value = read_text(field).await?;
                if !value.trim().is_empty() {
                    profiling_mode = Some(
                        ProfilingMode::from_str(&value).map_err(ApiError::bad_request)?,
                    );
                }
            }
            "runtime_options" => {
                let value = read_text(field).await?;
                if !value.trim().is_empty() {
                    runtime_options = Some(serde_json::from_str(&value).map_err(|e| {
                        ApiError::bad_request(format!("Invalid runtime options: {e}"))
                    })?);
                }
            }
            "file" => {
                let file_name = field
                    .file_name()
                    .map(|s| s.to_string())
                    .ok_or_else(|| ApiError::bad_request("Uploaded file must have a name"))?;
                let content = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {e}")))?;
                file = Some((file_name, content.to_vec()));
            }
            other => {
                warn!(field = other, "Ignoring unknown form field");
            }
        }
    }

    let task_type = task_type.ok_or_else(|| ApiError::bad_request("Missing field 'task_type'"))?;
    let language = language.ok_or_else(|| ApiError::bad_request("Missing field 'language'"))?;
    let (file_name, content) = file.ok_or_else(|| ApiError::bad_request("Missing file upload"))?;

    if !extension_matches(&language, &file_name) {
        return Err(ApiError::bad_request(format!(
            "File '{file_name}' does not look like a {language} source file"
        )));
    }

    Ok(SubmissionForm {
        task_type,
        language,
        profiling_mode,
        runtime_options,
        file_name,
        content,
    })
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read form field: {e}")))
}

/// Declared language must agree with the file extension for languages with a
/// known extension; anything else is waved through.
fn extension_matches(language: &Language, file_name: &str) -> bool {
    let ext = std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match language.as_str() {
        "python" => ext == "py",
        "c" => ext == "c",
        _ => true,
    }
}

async fn create_task(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<TaskResponse>), ApiError> {
    let form = parse_form(multipart).await?;

    let source_path = state
        .files
        .save(&form.file_name, &form.content)
        .await
        .map_err(Error::from)?;

    let request = TaskRequest {
        task_type: form.task_type,
        language: form.language,
        runtime_options: form.runtime_options,
        profiling_mode: form.profiling_mode,
        source_path: source_path.display().to_string(),
    };

    let task = match state.submission.submit(request).await {
        Ok(task) => task,
        Err(err) => {
            // The upload is orphaned if the task was never created.
            if let Err(e) = state.files.remove(&source_path).await {
                warn!(path = %source_path.display(), error = %e, "Failed to clean up rejected upload");
            }
            return Err(err.into());
        }
    };

    info!(task_id = %task.id, "Task created");
    Ok((StatusCode::CREATED, Json(task.into())))
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskResponse>, ApiError> {
    let id = TaskId::new(id).map_err(ApiError::from)?;
    let task = state.submission.lookup(&id).await?;
    Ok(Json(task.into()))
}
