//! ResearchQ CLI - drives the task queue from the command line.
//!
//! The work function here is a shell command whose stdout becomes the task
//! result; the queue itself treats it as opaque.

use std::path::PathBuf;
use std::process::Command as ShellCommand;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use researchq_queue::{report, QueueConfig, Task, TaskId, TaskQueue};

/// ResearchQ - persistent queue for long-running research tasks
#[derive(Parser)]
#[command(name = "researchq")]
#[command(about = "CLI for the ResearchQ task queue", long_about = None)]
struct Cli {
    /// Path of the task database
    #[arg(long, default_value = "tasks.db")]
    db: PathBuf,

    /// Keep a cancelled task Cancelled even if its work finishes later
    #[arg(long)]
    preserve_cancelled: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Admit a task without starting it
    Add {
        /// The research query
        query: String,

        /// Caller-defined task label
        #[arg(short, long, default_value = "research")]
        task_type: String,
    },

    /// Admit a task, run a shell command as its work, and wait for the outcome
    Run {
        /// The research query
        query: String,

        /// Shell command whose stdout becomes the task result
        #[arg(short, long)]
        command: String,

        /// Caller-defined task label
        #[arg(short, long, default_value = "research")]
        task_type: String,
    },

    /// List all tasks, newest first
    List {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show one task in full
    Show {
        /// Task ID
        id: String,
    },

    /// Cancel a queued or running task
    Cancel {
        /// Task ID to cancel
        id: String,
    },

    /// Remove one task row regardless of status
    Remove {
        /// Task ID to remove
        id: String,
    },

    /// Delete finished tasks older than the given age
    Cleanup {
        /// Age threshold in days
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = QueueConfig {
        db_path: cli.db,
        preserve_cancelled: cli.preserve_cancelled,
        ..QueueConfig::default()
    };
    let queue = TaskQueue::open(&config)?;

    match cli.command {
        Commands::Add { query, task_type } => {
            let id = queue.add_task(&query, &task_type)?;
            println!("Task admitted: {id}");
        }
        Commands::Run {
            query,
            command,
            task_type,
        } => {
            run_and_wait(&queue, &query, &task_type, command)?;
        }
        Commands::List { json } => {
            let tasks = queue.get_all_tasks()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else {
                for task in &tasks {
                    let (elapsed, _) = queue.get_task_elapsed_time(&task.id)?;
                    println!(
                        "{}  {:<9}  {:>8}  {}",
                        task.id,
                        task.status,
                        report::format_elapsed(elapsed),
                        queue.get_task_brief(&task.id)?,
                    );
                }
            }
        }
        Commands::Show { id } => {
            let id = TaskId::new(id);
            match queue.get_task(&id)? {
                Some(task) => print_task(&queue, &task)?,
                None => println!("Task not found: {id}"),
            }
        }
        Commands::Cancel { id } => {
            let id = TaskId::new(id);
            if queue.cancel_task(&id)? {
                println!("Task cancelled: {id}");
            } else {
                println!("Task was not cancellable: {id}");
            }
        }
        Commands::Remove { id } => {
            let id = TaskId::new(id);
            if queue.remove_task(&id)? {
                println!("Task removed: {id}");
            } else {
                println!("Task not found: {id}");
            }
        }
        Commands::Cleanup { days } => {
            let removed = queue.cleanup_old_tasks(days)?;
            println!("Removed {removed} finished task(s) older than {days} day(s)");
        }
    }

    Ok(())
}

/// Admit and start a task whose work is a shell command, then poll the queue
/// until the task reaches a terminal status.
fn run_and_wait(
    queue: &TaskQueue,
    query: &str,
    task_type: &str,
    command: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let id = queue.add_task(query, task_type)?;
    println!("Task admitted: {id}");

    queue.start_task(&id, move || {
        let output = ShellCommand::new("sh").arg("-c").arg(&command).output()?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(format!("command exited with {}: {}", output.status, stderr.trim()).into())
        }
    })?;

    loop {
        let task = queue
            .get_task(&id)?
            .ok_or_else(|| format!("task {id} disappeared while polling"))?;
        if task.is_terminal() {
            print_task(queue, &task)?;
            return Ok(());
        }
        thread::sleep(Duration::from_millis(250));
    }
}

fn print_task(queue: &TaskQueue, task: &Task) -> Result<(), Box<dyn std::error::Error>> {
    let (elapsed, active) = queue.get_task_elapsed_time(&task.id)?;
    println!("ID:        {}", task.id);
    println!("Brief:     {}", queue.get_task_brief(&task.id)?);
    println!("Type:      {}", task.task_type);
    println!("Status:    {}", task.status);
    println!(
        "Elapsed:   {}{}",
        report::format_elapsed(elapsed),
        if active { " (active)" } else { "" }
    );
    println!("Created:   {}", format_timestamp(task.created_at));
    if let Some(started) = task.started_at {
        println!("Started:   {}", format_timestamp(started));
    }
    if let Some(completed) = task.completed_at {
        println!("Finished:  {}", format_timestamp(completed));
    }
    if let Some(result) = &task.result {
        println!("Result:\n{result}");
    }
    if let Some(error) = &task.error {
        println!("Error:     {error}");
    }
    Ok(())
}

/// RFC 3339 to whole seconds; sub-second noise adds nothing on a queue
/// whose work runs for minutes.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}
