//! The task queue manager.
//!
//! `TaskQueue` composes the persistent store, admission control and the
//! executor behind one handle. The hosting application constructs it once
//! and passes it (or clones of it) to every caller; there is no global
//! instance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use chrono::{Duration, Utc};
use tracing::{info, warn};

use researchq_core::{Task, TaskId};

use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::report;
use crate::store::{TaskOutcome, TaskStore};

/// Outcome of an opaque work function: a report string, or a failure whose
/// message is recorded on the task row.
pub type WorkResult = Result<String, Box<dyn std::error::Error + Send + Sync>>;

/// Handle to the task queue. Cheap to clone; clones share the store and the
/// running-thread table.
#[derive(Clone)]
pub struct TaskQueue {
    store: Arc<TaskStore>,
    /// Advisory bookkeeping of spawned worker threads, keyed by task id.
    /// Carries no ownership of the store and no interruption capability.
    running: Arc<Mutex<HashMap<TaskId, JoinHandle<()>>>>,
    max_active: usize,
    preserve_cancelled: bool,
}

impl TaskQueue {
    /// Open the queue against the database named by `config`, creating the
    /// schema if needed.
    pub fn open(config: &QueueConfig) -> Result<Self, QueueError> {
        let store = TaskStore::open(&config.db_path)?;
        Ok(Self::from_store(store, config))
    }

    /// Build a queue over an already-open store. Used by tests and by hosts
    /// that manage the store themselves.
    pub fn from_store(store: TaskStore, config: &QueueConfig) -> Self {
        Self {
            store: Arc::new(store),
            running: Arc::new(Mutex::new(HashMap::new())),
            max_active: config.max_active,
            preserve_cancelled: config.preserve_cancelled,
        }
    }

    /// Admit a new task and return its id.
    ///
    /// Fails with `CapacityExceeded` when the number of tasks whose status
    /// is neither Completed nor Failed has reached the ceiling; nothing is
    /// inserted in that case.
    pub fn add_task(&self, query: &str, task_type: &str) -> Result<TaskId, QueueError> {
        if query.trim().is_empty() {
            return Err(QueueError::InvalidInput("query must not be empty"));
        }

        let task = Task::new(query, task_type);
        self.store.admit(&task, self.max_active)?;
        info!(task_id = %task.id, task_type, "task admitted");
        Ok(task.id)
    }

    /// Transition a Queued task to Running and execute `work` on a new
    /// background thread. Returns as soon as the thread is spawned.
    ///
    /// The thread records the terminal state itself: Completed plus the
    /// returned string, or Failed plus the error message. Work failures are
    /// never propagated back to this caller; they surface when the task is
    /// next polled.
    ///
    /// If the OS refuses to spawn the thread the task is rolled back to
    /// Queued so the start can be retried.
    pub fn start_task<F>(&self, id: &TaskId, work: F) -> Result<(), QueueError>
    where
        F: FnOnce() -> WorkResult + Send + 'static,
    {
        self.store.mark_running(id, Utc::now())?;
        info!(task_id = %id, "task started");

        let store = Arc::clone(&self.store);
        let running = Arc::clone(&self.running);
        let task_id = id.clone();
        let preserve_cancelled = self.preserve_cancelled;

        // Hold the table lock across spawn + insert so the worker's own
        // removal cannot run before its handle is registered.
        let mut table = self.running.lock().unwrap_or_else(|e| e.into_inner());
        let name = format!(
            "task-{}",
            id.as_str().get(..8).unwrap_or_else(|| id.as_str())
        );
        let spawned = thread::Builder::new()
            .name(name)
            .spawn(move || {
                let outcome = match work() {
                    Ok(result) => TaskOutcome::Completed(result),
                    Err(err) => TaskOutcome::Failed(err.to_string()),
                };
                match &outcome {
                    TaskOutcome::Completed(_) => {
                        info!(task_id = %task_id, "task completed")
                    }
                    TaskOutcome::Failed(message) => {
                        warn!(task_id = %task_id, error = %message, "task failed")
                    }
                }

                if let Err(err) =
                    store.finish(&task_id, &outcome, Utc::now(), preserve_cancelled)
                {
                    warn!(task_id = %task_id, error = %err, "failed to record task outcome");
                }
                running
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&task_id);
            });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                // No worker exists; put the row back so the caller can
                // retry instead of leaving it wedged in Running.
                if let Err(revert) = self.store.requeue(id) {
                    warn!(task_id = %id, error = %revert, "failed to requeue after spawn error");
                }
                return Err(QueueError::Spawn(err));
            }
        };
        table.insert(id.clone(), handle);
        Ok(())
    }

    /// Cancel a Queued or Running task. Returns true if the status changed
    /// to Cancelled, false for terminal or unknown ids.
    ///
    /// Cancellation is advisory at the data layer: an in-flight work
    /// function is never interrupted, and unless the queue was configured
    /// with `preserve_cancelled` its eventual terminal write overwrites the
    /// Cancelled status.
    pub fn cancel_task(&self, id: &TaskId) -> Result<bool, QueueError> {
        let cancelled = self.store.mark_cancelled(id, Utc::now())?;
        if cancelled {
            info!(task_id = %id, "task cancelled");
        }
        Ok(cancelled)
    }

    /// Fetch one task by id.
    pub fn get_task(&self, id: &TaskId) -> Result<Option<Task>, QueueError> {
        self.store.get(id)
    }

    /// All tasks, newest first.
    pub fn get_all_tasks(&self) -> Result<Vec<Task>, QueueError> {
        self.store.list_all()
    }

    /// Elapsed time for a task and whether it is still active. An unknown
    /// id yields `(zero, false)`.
    pub fn get_task_elapsed_time(&self, id: &TaskId) -> Result<(Duration, bool), QueueError> {
        match self.store.get(id)? {
            Some(task) => Ok(report::elapsed(&task, Utc::now())),
            None => Ok((Duration::zero(), false)),
        }
    }

    /// Brief description of a task: the first words of its query.
    pub fn get_task_brief(&self, id: &TaskId) -> Result<String, QueueError> {
        let task = self.store.get(id)?;
        Ok(report::brief(task.as_ref().map(|t| t.query.as_str())))
    }

    /// Delete terminal tasks created more than `days` days ago. Returns the
    /// number of rows removed.
    pub fn cleanup_old_tasks(&self, days: i64) -> Result<usize, QueueError> {
        let cutoff = Utc::now() - Duration::days(days);
        let removed = self.store.cleanup_older_than(cutoff)?;
        if removed > 0 {
            info!(removed, days, "cleaned up old tasks");
        }
        Ok(removed)
    }

    /// Delete one task row regardless of status. Returns whether a row was
    /// deleted.
    pub fn remove_task(&self, id: &TaskId) -> Result<bool, QueueError> {
        let removed = self.store.remove(id)?;
        if removed {
            info!(task_id = %id, "task removed");
        }
        Ok(removed)
    }

    /// Snapshot of task ids with a live worker thread. Diagnostic only:
    /// the table lags the store by the instants around spawn and exit.
    pub fn running_ids(&self) -> Vec<TaskId> {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("max_active", &self.max_active)
            .field("preserve_cancelled", &self.preserve_cancelled)
            .finish_non_exhaustive()
    }
}
