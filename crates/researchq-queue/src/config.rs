//! Queue configuration.

use std::path::PathBuf;

/// Default ceiling on simultaneously active tasks.
pub const DEFAULT_MAX_ACTIVE: usize = 5;

/// Task queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Path of the SQLite database file.
    pub db_path: PathBuf,

    /// Ceiling on tasks whose status is neither Completed nor Failed.
    pub max_active: usize,

    /// When set, a task cancelled while Running stays Cancelled: the
    /// executor's terminal write only applies while the row is still
    /// Running. When unset (the default), the terminal write is
    /// unconditional and overwrites a concurrent cancellation once the
    /// work function finishes.
    pub preserve_cancelled: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("tasks.db"),
            max_active: DEFAULT_MAX_ACTIVE,
            preserve_cancelled: false,
        }
    }
}

impl QueueConfig {
    /// Configuration pointing at the given database file.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: path.into(),
            ..Self::default()
        }
    }
}
