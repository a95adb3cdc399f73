//! Queue errors.

use researchq_core::{TaskId, TaskStatus};
use thiserror::Error;

/// Errors returned by the task queue and its store.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Admission refused: the active-task ceiling is reached.
    #[error("Maximum of {limit} active tasks allowed; wait for some tasks to finish")]
    CapacityExceeded { limit: usize },

    /// Operation referenced a nonexistent task id.
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    /// Operation not legal from the task's current status.
    #[error("Task {id} is in state {status}, operation requires Queued")]
    InvalidState { id: TaskId, status: TaskStatus },

    /// Invalid caller input.
    #[error("Invalid input: {0}")]
    InvalidInput(&'static str),

    /// A persisted row could not be decoded back into a Task.
    #[error("Corrupt task row: {0}")]
    Corrupt(&'static str),

    /// Underlying SQLite failure.
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// The OS refused to spawn a worker thread.
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}
