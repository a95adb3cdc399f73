//! Reporting helpers: elapsed time and brief task descriptions.

use chrono::{DateTime, Duration, Utc};
use researchq_core::{Task, TaskStatus};

/// Number of query tokens kept by [`brief`].
const BRIEF_WORDS: usize = 10;

/// Placeholder when a task or its query is absent.
const UNKNOWN_TASK: &str = "Unknown task";

/// Elapsed time for a task and whether it is still active.
///
/// Queued: time since creation. Running: time since start (falling back to
/// creation if `started_at` is missing). Terminal: the span the task was
/// actually running, `completed_at - started_at`, falling back to
/// `completed_at - created_at`, else zero.
pub fn elapsed(task: &Task, now: DateTime<Utc>) -> (Duration, bool) {
    match task.status {
        TaskStatus::Queued => (now - task.created_at, true),
        TaskStatus::Running => {
            let start = task.started_at.unwrap_or(task.created_at);
            (now - start, true)
        }
        _ => match (task.completed_at, task.started_at) {
            (Some(completed), Some(started)) => (completed - started, false),
            (Some(completed), None) => (completed - task.created_at, false),
            (None, _) => (Duration::zero(), false),
        },
    }
}

/// First [`BRIEF_WORDS`] whitespace-delimited tokens of the query, with an
/// ellipsis marker when truncated. `None` or an empty query yields a fixed
/// placeholder.
pub fn brief(query: Option<&str>) -> String {
    let Some(query) = query.filter(|q| !q.is_empty()) else {
        return UNKNOWN_TASK.to_string();
    };

    let words: Vec<&str> = query.split_whitespace().collect();
    if words.len() <= BRIEF_WORDS {
        query.to_string()
    } else {
        format!("{}...", words[..BRIEF_WORDS].join(" "))
    }
}

/// Human-readable rendering of an elapsed duration: `1h 2m 3s`, `2m 5s`,
/// or `42s`. Negative durations render as `0s`.
pub fn format_elapsed(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
