//! Lifecycle status for tasks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a Task in the queue.
///
/// Transitions: Queued -> Running -> {Completed, Failed}, and
/// Queued/Running -> Cancelled. Completed, Failed and Cancelled are
/// terminal for caller-initiated transitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Task admitted but not yet started.
    #[default]
    Queued,
    /// Task's work function is executing on a background thread.
    Running,
    /// Work function returned successfully.
    Completed,
    /// Work function returned an error.
    Failed,
    /// Task was cancelled by the caller.
    Cancelled,
}

impl TaskStatus {
    /// Returns true if the status is terminal (no caller-initiated
    /// forward transition is defined from it).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true while the task is waiting or executing.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    /// Stable string form, used as the persisted column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "Queued",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Queued" => Ok(Self::Queued),
            "Running" => Ok(Self::Running),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            "Cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!TaskStatus::Queued.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            TaskStatus::Queued,
            TaskStatus::Running,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>(), Ok(status));
        }
        assert!("Done".parse::<TaskStatus>().is_err());
    }
}
