//! End-to-end lifecycle tests running against a SQLite file on disk.

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use researchq_queue::{QueueConfig, QueueError, Task, TaskId, TaskQueue, TaskStatus};

fn temp_db(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let dir = base.join(format!("researchq_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir.join("tasks.db")
}

fn open_queue(test_name: &str) -> TaskQueue {
    TaskQueue::open(&QueueConfig::with_db_path(temp_db(test_name))).expect("open queue")
}

fn wait_for_status(queue: &TaskQueue, id: &TaskId, status: TaskStatus) -> Task {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let task = queue.get_task(id).expect("get task").expect("task present");
        if task.status == status {
            return task;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for {status}, task is {}",
            task.status
        );
        thread::sleep(Duration::from_millis(10));
    }
}

fn wait_until_idle(queue: &TaskQueue) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !queue.running_ids().is_empty() {
        assert!(Instant::now() < deadline, "worker threads did not drain");
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn sixth_active_task_is_refused() {
    let queue = open_queue("sixth_active_task_is_refused");
    for i in 0..5 {
        queue
            .add_task(&format!("query {i}"), "research")
            .expect("admit");
    }

    let err = queue.add_task("one over the ceiling", "research").unwrap_err();
    assert!(matches!(err, QueueError::CapacityExceeded { limit: 5 }));
    assert_eq!(queue.get_all_tasks().expect("list").len(), 5);
}

#[test]
fn cancelled_task_still_counts_against_admission() {
    // Admission counts every status outside {Completed, Failed}, so a
    // cancelled task keeps occupying a slot until cleaned up or removed.
    let queue = open_queue("cancelled_task_still_counts_against_admission");
    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(queue.add_task(&format!("query {i}"), "research").expect("admit"));
    }
    assert!(queue.cancel_task(&ids[0]).expect("cancel"));

    let err = queue.add_task("still refused", "research").unwrap_err();
    assert!(matches!(err, QueueError::CapacityExceeded { .. }));
}

#[test]
fn empty_query_is_rejected_before_the_store() {
    let queue = open_queue("empty_query_is_rejected_before_the_store");
    let err = queue.add_task("   ", "research").unwrap_err();
    assert!(matches!(err, QueueError::InvalidInput(_)));
    assert!(queue.get_all_tasks().expect("list").is_empty());
}

#[test]
fn successful_work_completes_the_task() {
    let queue = open_queue("successful_work_completes_the_task");
    let id = queue.add_task("summarize rust history", "research").expect("admit");

    queue.start_task(&id, || Ok("R".to_string())).expect("start");
    let task = wait_for_status(&queue, &id, TaskStatus::Completed);

    assert_eq!(task.result.as_deref(), Some("R"));
    assert!(task.error.is_none());
    let started = task.started_at.expect("started_at set");
    let completed = task.completed_at.expect("completed_at set");
    assert!(task.created_at <= started);
    assert!(started <= completed);
}

#[test]
fn failing_work_records_the_error() {
    let queue = open_queue("failing_work_records_the_error");
    let id = queue.add_task("doomed", "research").expect("admit");

    queue
        .start_task(&id, || Err("upstream API returned 500".into()))
        .expect("start");
    let task = wait_for_status(&queue, &id, TaskStatus::Failed);

    assert_eq!(task.error.as_deref(), Some("upstream API returned 500"));
    assert!(task.result.is_none());
    assert!(task.completed_at.is_some());
}

#[test]
fn start_requires_a_queued_task() {
    let queue = open_queue("start_requires_a_queued_task");
    let id = queue.add_task("run once", "research").expect("admit");

    queue.start_task(&id, || Ok(String::new())).expect("first start");
    let err = queue.start_task(&id, || Ok(String::new())).unwrap_err();
    assert!(matches!(err, QueueError::InvalidState { .. }));

    let missing = TaskId::generate();
    let err = queue.start_task(&missing, || Ok(String::new())).unwrap_err();
    assert!(matches!(err, QueueError::TaskNotFound(_)));
    wait_until_idle(&queue);
}

#[test]
fn cancelled_queued_task_cannot_be_started() {
    let queue = open_queue("cancelled_queued_task_cannot_be_started");
    let id = queue.add_task("never runs", "research").expect("admit");

    assert!(queue.cancel_task(&id).expect("cancel"));
    let task = queue.get_task(&id).expect("get").expect("present");
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert!(task.completed_at.is_some());

    let err = queue.start_task(&id, || Ok(String::new())).unwrap_err();
    assert!(matches!(
        err,
        QueueError::InvalidState {
            status: TaskStatus::Cancelled,
            ..
        }
    ));
}

#[test]
fn cancel_of_terminal_or_missing_task_returns_false() {
    let queue = open_queue("cancel_of_terminal_or_missing_task_returns_false");
    let id = queue.add_task("quick", "research").expect("admit");
    queue.start_task(&id, || Ok("done".to_string())).expect("start");
    wait_for_status(&queue, &id, TaskStatus::Completed);

    assert!(!queue.cancel_task(&id).expect("cancel terminal"));
    assert!(!queue.cancel_task(&TaskId::generate()).expect("cancel missing"));
}

#[test]
fn cancel_during_run_is_overwritten_by_the_terminal_write() {
    // The executor's terminal write is unconditional by default: a task
    // cancelled while Running reverts to Completed once the work returns.
    let queue = open_queue("cancel_during_run_is_overwritten");
    let id = queue.add_task("slow research", "research").expect("admit");

    queue
        .start_task(&id, || {
            thread::sleep(Duration::from_millis(200));
            Ok("R".to_string())
        })
        .expect("start");

    thread::sleep(Duration::from_millis(50));
    assert!(queue.cancel_task(&id).expect("cancel"));
    let task = queue.get_task(&id).expect("get").expect("present");
    assert_eq!(task.status, TaskStatus::Cancelled);

    let task = wait_for_status(&queue, &id, TaskStatus::Completed);
    assert_eq!(task.result.as_deref(), Some("R"));
}

#[test]
fn preserve_cancelled_mode_keeps_the_cancellation() {
    let mut config = QueueConfig::with_db_path(temp_db("preserve_cancelled_mode"));
    config.preserve_cancelled = true;
    let queue = TaskQueue::open(&config).expect("open queue");

    let id = queue.add_task("slow research", "research").expect("admit");
    queue
        .start_task(&id, || {
            thread::sleep(Duration::from_millis(200));
            Ok("R".to_string())
        })
        .expect("start");

    thread::sleep(Duration::from_millis(50));
    assert!(queue.cancel_task(&id).expect("cancel"));
    wait_until_idle(&queue);

    let task = queue.get_task(&id).expect("get").expect("present");
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert!(task.result.is_none());
}

#[test]
fn elapsed_time_tracks_the_lifecycle() {
    let queue = open_queue("elapsed_time_tracks_the_lifecycle");
    let id = queue.add_task("timed", "research").expect("admit");

    let (elapsed, active) = queue.get_task_elapsed_time(&id).expect("elapsed");
    assert!(active);
    assert!(elapsed >= chrono::Duration::zero());

    queue
        .start_task(&id, || {
            thread::sleep(Duration::from_millis(50));
            Ok(String::new())
        })
        .expect("start");
    let task = wait_for_status(&queue, &id, TaskStatus::Completed);

    let (elapsed, active) = queue.get_task_elapsed_time(&id).expect("elapsed");
    assert!(!active);
    assert_eq!(
        elapsed,
        task.completed_at.expect("completed") - task.started_at.expect("started")
    );

    let (elapsed, active) = queue
        .get_task_elapsed_time(&TaskId::generate())
        .expect("elapsed for missing id");
    assert!(!active);
    assert_eq!(elapsed, chrono::Duration::zero());
}

#[test]
fn brief_truncates_long_queries() {
    let queue = open_queue("brief_truncates_long_queries");
    let long = queue
        .add_task(
            "a b c d e f g h i j k l m n o",
            "research",
        )
        .expect("admit");
    let short = queue.add_task("rust async history", "research").expect("admit");

    assert_eq!(
        queue.get_task_brief(&long).expect("brief"),
        "a b c d e f g h i j..."
    );
    assert_eq!(
        queue.get_task_brief(&short).expect("brief"),
        "rust async history"
    );
    assert_eq!(
        queue.get_task_brief(&TaskId::generate()).expect("brief"),
        "Unknown task"
    );
}

#[test]
fn cleanup_removes_all_terminal_tasks_at_zero_days() {
    let queue = open_queue("cleanup_removes_all_terminal_tasks");
    let done = queue.add_task("done", "research").expect("admit");
    let cancelled = queue.add_task("cancelled", "research").expect("admit");
    let queued = queue.add_task("queued", "research").expect("admit");

    queue.start_task(&done, || Ok("r".to_string())).expect("start");
    wait_for_status(&queue, &done, TaskStatus::Completed);
    assert!(queue.cancel_task(&cancelled).expect("cancel"));

    // Terminal rows were created before "now", so a zero-day window drops
    // them all; the queued task must survive.
    let removed = queue.cleanup_old_tasks(0).expect("cleanup");
    assert_eq!(removed, 2);

    let remaining = queue.get_all_tasks().expect("list");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, queued);
    assert!(!remaining[0].is_terminal());
}

#[test]
fn remove_task_deletes_any_row_by_id() {
    let queue = open_queue("remove_task_deletes_any_row_by_id");
    let id = queue.add_task("to be removed", "research").expect("admit");

    assert!(queue.remove_task(&id).expect("remove"));
    assert!(queue.get_task(&id).expect("get").is_none());
    assert!(!queue.remove_task(&id).expect("remove again"));
}

#[test]
fn concurrent_admissions_never_exceed_the_ceiling() {
    let queue = open_queue("concurrent_admissions_never_exceed_the_ceiling");

    let mut handles = Vec::new();
    for i in 0..10 {
        let queue = queue.clone();
        handles.push(thread::spawn(move || {
            queue.add_task(&format!("concurrent {i}"), "research").is_ok()
        }));
    }
    let admitted = handles
        .into_iter()
        .map(|h| h.join().expect("join"))
        .filter(|&admitted| admitted)
        .count();

    assert_eq!(admitted, 5);
    assert_eq!(queue.get_all_tasks().expect("list").len(), 5);
}

#[test]
fn worker_table_drains_after_completion() {
    let queue = open_queue("worker_table_drains_after_completion");
    let id = queue.add_task("bookkeeping", "research").expect("admit");
    queue
        .start_task(&id, || {
            thread::sleep(Duration::from_millis(50));
            Ok(String::new())
        })
        .expect("start");

    assert!(queue.running_ids().contains(&id));
    wait_until_idle(&queue);
    assert!(queue.running_ids().is_empty());
}
