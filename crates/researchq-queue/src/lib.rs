//! ResearchQ Task Queue Manager
//!
//! Accepts long-running research jobs, persists their lifecycle state in
//! SQLite, bounds how many may be outstanding at once, executes each job on
//! a background thread, and lets callers poll status, fetch results, or
//! cancel.
//!
//! The job itself is opaque to the queue: any `FnOnce() -> WorkResult`
//! handed to [`TaskQueue::start_task`]. Prompt construction, search calls
//! and report rendering live with the caller.

pub mod config;
pub mod error;
pub mod manager;
pub mod report;
pub mod store;

// Re-export commonly used types
pub use config::{QueueConfig, DEFAULT_MAX_ACTIVE};
pub use error::QueueError;
pub use manager::{TaskQueue, WorkResult};
pub use store::{TaskOutcome, TaskStore};

pub use researchq_core::{Task, TaskId, TaskStatus};
