//! Error types for taskhub.

use std::path::PathBuf;
use std::time::Duration;

use uuid::Uuid;

use crate::jobs::model::JobState;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Step error: {0}")]
    Step(#[from] StepError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Job lifecycle errors surfaced to callers of the job service.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Invalid job submission: {reason}")]
    InvalidInput { reason: String },

    #[error("Job {id} not found")]
    NotFound { id: Uuid },

    #[error("Job {id} already in state {state}, cannot transition to {target}")]
    InvalidTransition {
        id: Uuid,
        state: JobState,
        target: JobState,
    },

    #[error("Worker pool rejected job {id}: {reason}")]
    PoolRejected { id: Uuid, reason: String },
}

/// Failures of a single external transformation step.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to prepare output directory: {0}")]
    Prepare(#[source] std::io::Error),

    #[error("Step exited with code {}{}", .code, format_stderr(.stderr))]
    NonZeroExit { code: i32, stderr: String },

    #[error("Step terminated by signal{}", format_stderr(.stderr))]
    Signalled { stderr: String },

    #[error("Step exited successfully but produced no output at {}", .expected.display())]
    MissingOutput { expected: PathBuf },

    #[error("Step timed out after {0:?}")]
    Timeout(Duration),

    #[error("Step cancelled")]
    Cancelled,

    #[error("Step panicked: {0}")]
    Panicked(String),

    #[error("Failed waiting on step process: {0}")]
    Wait(#[source] std::io::Error),
}

fn format_stderr(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

/// Completion-notice delivery errors. Never affect job state.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Invalid address {address}: {reason}")]
    Address { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Failed to attach {}: {reason}", .path.display())]
    Attachment { path: PathBuf, reason: String },

    #[error("Transport failed: {0}")]
    Transport(String),
}

/// Upload storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Invalid file name: {0:?}")]
    InvalidFileName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
