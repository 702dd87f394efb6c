//! # vault-tasks
//!
//! Submit-now, poll-later inference for npuvault.
//!
//! `InferenceQueue::submit` records a pending task and returns its id at once.
//! A pool of long-lived workers takes tasks off an in-process channel, makes
//! sure the model is resident, runs inference and writes the terminal outcome
//! exactly once into the `ResultStore`.

use thiserror::Error;

pub mod queue;
pub mod store;
pub mod task;

pub use queue::{InferenceQueue, QueueStats, CANCELLED_AT_SHUTDOWN};
pub use store::{InMemoryResultStore, ResultStore, ResultStoreStats};
pub use task::{TaskId, TaskRecord, TaskState, TaskStatus};

/// Result type for task operations
pub type Result<T> = std::result::Result<T, TaskError>;

/// Errors that can occur while submitting or tracking tasks
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Task {0} already reached a terminal state")]
    AlreadyTerminal(TaskId),

    #[error("Invalid task request: {0}")]
    InvalidRequest(String),

    #[error("Inference queue is closed")]
    QueueClosed,

    #[error("Inference queue is already running")]
    AlreadyRunning,
}

impl TaskError {
    /// Check if the error was caused by the caller
    pub fn is_client_error(&self) -> bool {
        matches!(self, TaskError::NotFound(_) | TaskError::InvalidRequest(_))
    }
}

impl From<TaskError> for vault_core::Error {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::NotFound(_) => vault_core::Error::not_found(err.to_string()),
            TaskError::InvalidRequest(_) => vault_core::Error::validation(err.to_string()),
            TaskError::AlreadyTerminal(_) | TaskError::AlreadyRunning => {
                vault_core::Error::conflict(err.to_string())
            }
            TaskError::QueueClosed => vault_core::Error::internal(err.to_string()),
        }
    }
}
