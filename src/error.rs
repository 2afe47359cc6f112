//! Error types for profiled.

use std::time::Duration;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Task validation and lookup errors. These surface synchronously at the
/// submission boundary and never create a task record.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Invalid task identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Task type '{0}' is not supported")]
    UnsupportedTaskType(String),

    #[error("No profiler available for language '{language}' in {mode} mode")]
    UnsupportedLanguage { language: String, mode: String },

    #[error("Task {0} not found")]
    NotFound(String),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failures inside a profiler strategy. All of them funnel to a terminal
/// FAILED task with the message preserved verbatim.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Failed to spawn {command}: {reason}")]
    Spawn { command: String, reason: String },

    #[error("{phase} exited with status {status}: {stderr}")]
    CommandFailed {
        phase: String,
        status: i32,
        stdout: String,
        stderr: String,
    },

    #[error("{phase} timed out after {timeout:?}")]
    Timeout { phase: String, timeout: Duration },

    #[error("Inference request failed: {0}")]
    Inference(String),

    #[error("Inference service returned an empty response")]
    EmptyResponse,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Job scheduling errors.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Failed to persist job {job_id}: {reason}")]
    JobScheduling { job_id: String, reason: String },

    #[error("Job payload could not be decoded: {0}")]
    Payload(String),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
