//! The Task record.

use crate::{TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A Task represents one unit of queued research work with a durable
/// identity and lifecycle status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: TaskId,

    /// Opaque payload describing the work; non-empty.
    pub query: String,

    /// Caller-supplied label, not interpreted by the queue.
    pub task_type: String,

    /// Current lifecycle status.
    pub status: TaskStatus,

    /// When the task was admitted. Immutable.
    pub created_at: DateTime<Utc>,

    /// When the task transitioned Queued -> Running. Set exactly once.
    pub started_at: Option<DateTime<Utc>>,

    /// When the task reached a terminal status. Set exactly once.
    pub completed_at: Option<DateTime<Utc>>,

    /// Work output; set only on Completed.
    pub result: Option<String>,

    /// Failure message; set only on Failed.
    pub error: Option<String>,
}

impl Task {
    /// Create a new Queued task with a fresh id and `created_at = now`.
    pub fn new(query: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self {
            id: TaskId::generate(),
            query: query.into(),
            task_type: task_type.into(),
            status: TaskStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    /// Builder method to set a specific ID (useful for testing).
    pub fn with_id(mut self, id: TaskId) -> Self {
        self.id = id;
        self
    }

    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_is_queued() {
        let task = Task::new("what is rust", "research");
        assert_eq!(task.status, TaskStatus::Queued);
        assert!(task.started_at.is_none());
        assert!(task.completed_at.is_none());
        assert!(task.result.is_none());
        assert!(task.error.is_none());
    }

    #[test]
    fn test_with_id() {
        let id = TaskId::new("fixed-id");
        let task = Task::new("q", "t").with_id(id.clone());
        assert_eq!(task.id, id);
    }
}
