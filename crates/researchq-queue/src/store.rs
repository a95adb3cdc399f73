//! Persistent task store.
//!
//! One SQLite connection guarded by a single process-wide mutex. SQLite does
//! not support concurrent writers on one connection, so every operation locks
//! for its full duration: open transaction, mutate, commit, release. Critical
//! sections are short and never held across the opaque work functions.
//!
//! Check-then-act sequences (admission count + insert, status check + update)
//! are exposed as composite operations so they stay atomic under the one lock.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use researchq_core::{Task, TaskId, TaskStatus};

use crate::error::QueueError;

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS tasks (
    id           TEXT PRIMARY KEY,
    query        TEXT NOT NULL,
    task_type    TEXT NOT NULL,
    status       TEXT NOT NULL,
    created_at   INTEGER NOT NULL,
    started_at   INTEGER,
    completed_at INTEGER,
    result       TEXT,
    error        TEXT
);";

/// How a finished work function resolved, as recorded by the executor.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// Work returned a report; stored in `result`.
    Completed(String),
    /// Work failed; message stored in `error`.
    Failed(String),
}

/// Durable storage for task rows.
///
/// All access goes through `&self` methods; the interior mutex serializes
/// callers from any thread.
#[derive(Debug)]
pub struct TaskStore {
    conn: Mutex<Connection>,
}

impl TaskStore {
    /// Open (or create) the database at `path` and install the schema if
    /// it is not present yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, QueueError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory store, used by tests. Same schema, no durability.
    pub fn open_in_memory() -> Result<Self, QueueError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, QueueError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // Store methods never panic while holding the guard, so a poisoned
        // mutex can only come from a panicking sqlite binding; recover the
        // connection rather than cascading the panic.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Atomically check the active-task ceiling and insert `task` as Queued.
    ///
    /// "Active" means status not in {Completed, Failed}; a Cancelled row
    /// still occupies a slot until cleaned up or removed.
    pub fn admit(&self, task: &Task, max_active: usize) -> Result<(), QueueError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let active: i64 = tx.query_row(
            "SELECT COUNT(*) FROM tasks WHERE status NOT IN (?1, ?2)",
            params![
                TaskStatus::Completed.as_str(),
                TaskStatus::Failed.as_str()
            ],
            |row| row.get(0),
        )?;
        if active as usize >= max_active {
            return Err(QueueError::CapacityExceeded { limit: max_active });
        }

        tx.execute(
            "INSERT INTO tasks (id, query, task_type, status, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                task.id.as_str(),
                task.query,
                task.task_type,
                task.status.as_str(),
                task.created_at.timestamp_millis(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Transition Queued -> Running, recording `started_at`.
    pub fn mark_running(
        &self,
        id: &TaskId,
        started_at: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let status = current_status_tx(&tx, id)?;
        match status {
            None => return Err(QueueError::TaskNotFound(id.clone())),
            Some(TaskStatus::Queued) => {}
            Some(status) => {
                return Err(QueueError::InvalidState {
                    id: id.clone(),
                    status,
                })
            }
        }

        tx.execute(
            "UPDATE tasks SET status = ?1, started_at = ?2 WHERE id = ?3",
            params![
                TaskStatus::Running.as_str(),
                started_at.timestamp_millis(),
                id.as_str(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Terminal write performed by the executor once the work function
    /// returns.
    ///
    /// With `only_if_running` unset this is unconditional: a concurrent
    /// cancellation is silently overwritten. With it set, the update carries
    /// a `status = Running` guard and a cancelled row is left untouched.
    pub fn finish(
        &self,
        id: &TaskId,
        outcome: &TaskOutcome,
        completed_at: DateTime<Utc>,
        only_if_running: bool,
    ) -> Result<(), QueueError> {
        let (status, result, error) = match outcome {
            TaskOutcome::Completed(result) => {
                (TaskStatus::Completed, Some(result.as_str()), None)
            }
            TaskOutcome::Failed(message) => (TaskStatus::Failed, None, Some(message.as_str())),
        };

        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let changed = if only_if_running {
            tx.execute(
                "UPDATE tasks SET status = ?1, completed_at = ?2, result = ?3, error = ?4 \
                 WHERE id = ?5 AND status = ?6",
                params![
                    status.as_str(),
                    completed_at.timestamp_millis(),
                    result,
                    error,
                    id.as_str(),
                    TaskStatus::Running.as_str(),
                ],
            )?
        } else {
            tx.execute(
                "UPDATE tasks SET status = ?1, completed_at = ?2, result = ?3, error = ?4 \
                 WHERE id = ?5",
                params![
                    status.as_str(),
                    completed_at.timestamp_millis(),
                    result,
                    error,
                    id.as_str(),
                ],
            )?
        };

        if changed == 0 {
            let existing = current_status_tx(&tx, id)?;
            match existing {
                None => return Err(QueueError::TaskNotFound(id.clone())),
                // Guarded mode and the row is no longer Running; the
                // cancellation (or earlier terminal write) wins.
                Some(_) => {}
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Roll a Running task back to Queued, clearing `started_at`. Used when
    /// the worker thread could not be spawned, so the caller can retry the
    /// start.
    ///
    /// A row that is no longer Running (e.g. cancelled in the meantime) is
    /// left untouched.
    pub fn requeue(&self, id: &TaskId) -> Result<(), QueueError> {
        let conn = self.lock();
        conn.execute(
            "UPDATE tasks SET status = ?1, started_at = NULL \
             WHERE id = ?2 AND status = ?3",
            params![
                TaskStatus::Queued.as_str(),
                id.as_str(),
                TaskStatus::Running.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Set status Cancelled if the task is still Queued or Running.
    ///
    /// Returns false, without touching the row, for terminal tasks and for
    /// ids that do not exist.
    pub fn mark_cancelled(
        &self,
        id: &TaskId,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, QueueError> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE tasks SET status = ?1, completed_at = ?2 \
             WHERE id = ?3 AND status IN (?4, ?5)",
            params![
                TaskStatus::Cancelled.as_str(),
                completed_at.timestamp_millis(),
                id.as_str(),
                TaskStatus::Queued.as_str(),
                TaskStatus::Running.as_str(),
            ],
        )?;
        Ok(changed > 0)
    }

    /// Fetch one task by id.
    pub fn get(&self, id: &TaskId) -> Result<Option<Task>, QueueError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, query, task_type, status, created_at, started_at, \
                    completed_at, result, error \
             FROM tasks WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id.as_str()])?;
        match rows.next()? {
            Some(row) => Ok(Some(task_from_row(row)?)),
            None => Ok(None),
        }
    }

    /// All tasks, newest `created_at` first. Ties broken by insertion
    /// order, later insertions first.
    pub fn list_all(&self) -> Result<Vec<Task>, QueueError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, query, task_type, status, created_at, started_at, \
                    completed_at, result, error \
             FROM tasks ORDER BY created_at DESC, rowid DESC",
        )?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(task_from_row(row)?);
        }
        Ok(out)
    }

    /// Count of tasks holding an admission slot.
    pub fn count_active(&self) -> Result<usize, QueueError> {
        let conn = self.lock();
        let active: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE status NOT IN (?1, ?2)",
            params![
                TaskStatus::Completed.as_str(),
                TaskStatus::Failed.as_str()
            ],
            |row| row.get(0),
        )?;
        Ok(active as usize)
    }

    /// Physically delete one row regardless of status. Returns whether a
    /// row was deleted.
    pub fn remove(&self, id: &TaskId) -> Result<bool, QueueError> {
        let conn = self.lock();
        let changed = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id.as_str()])?;
        Ok(changed > 0)
    }

    /// Delete terminal rows created before `cutoff`. Returns the number of
    /// rows removed.
    pub fn cleanup_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, QueueError> {
        let conn = self.lock();
        let changed = conn.execute(
            "DELETE FROM tasks WHERE created_at < ?1 AND status IN (?2, ?3, ?4)",
            params![
                cutoff.timestamp_millis(),
                TaskStatus::Completed.as_str(),
                TaskStatus::Failed.as_str(),
                TaskStatus::Cancelled.as_str(),
            ],
        )?;
        Ok(changed)
    }
}

fn current_status_tx(
    tx: &rusqlite::Transaction<'_>,
    id: &TaskId,
) -> Result<Option<TaskStatus>, QueueError> {
    let raw: Option<String> = tx
        .query_row(
            "SELECT status FROM tasks WHERE id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    raw.map(|s| parse_status(&s)).transpose()
}

fn parse_status(raw: &str) -> Result<TaskStatus, QueueError> {
    raw.parse()
        .map_err(|_| QueueError::Corrupt("unrecognized status value"))
}

fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>, QueueError> {
    DateTime::from_timestamp_millis(ms).ok_or(QueueError::Corrupt("timestamp out of range"))
}

fn task_from_row(row: &Row<'_>) -> Result<Task, QueueError> {
    let status = parse_status(&row.get::<_, String>(3)?)?;
    let started_at = row
        .get::<_, Option<i64>>(5)?
        .map(millis_to_datetime)
        .transpose()?;
    let completed_at = row
        .get::<_, Option<i64>>(6)?
        .map(millis_to_datetime)
        .transpose()?;

    Ok(Task {
        id: TaskId::new(row.get::<_, String>(0)?),
        query: row.get(1)?,
        task_type: row.get(2)?,
        status,
        created_at: millis_to_datetime(row.get::<_, i64>(4)?)?,
        started_at,
        completed_at,
        result: row.get(7)?,
        error: row.get(8)?,
    })
}
