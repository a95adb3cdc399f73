//! ResearchQ Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Database
//! - Threads/runtime specifics
//!
//! All types here represent the core business domain of ResearchQ:
//! a task, its durable identity, and its lifecycle status.

pub mod ids;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use ids::TaskId;
pub use status::TaskStatus;
pub use task::Task;
