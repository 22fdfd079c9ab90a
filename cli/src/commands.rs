//! Subcommands and their output.

use crate::error::{CliError, Result};
use clap::Subcommand;
use ferry_engine::{PassOutcome, PendingOp, Status, Task, TaskClient, TaskDraft, TaskPatch};
use std::collections::HashSet;
use std::io::Write;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a task
    Add {
        title: String,
        #[arg(short, long, default_value = "")]
        description: String,
        #[arg(short, long, value_parser = parse_status)]
        status: Option<Status>,
    },
    /// List cached tasks; `*` marks changes not yet on the server
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Change a task's title or description
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Move a task to pending, in_progress or completed
    Status {
        id: String,
        #[arg(value_parser = parse_status)]
        status: Status,
    },
    /// Delete a task
    Rm { id: String },
    /// Replay queued changes against the server
    Sync,
    /// Show queued changes in replay order
    Pending,
    /// Re-download the server's task list into the cache
    Refresh,
}

pub fn parse_status(raw: &str) -> Result<Status> {
    Status::parse(raw).ok_or_else(|| CliError::InvalidStatus(raw.to_string()))
}

/// Run one subcommand against the client, writing results to `out`.
pub async fn run(client: &TaskClient, command: Command, out: &mut dyn Write) -> Result<()> {
    match command {
        Command::Add {
            title,
            description,
            status,
        } => {
            let mut draft = TaskDraft::new(title).with_description(description);
            draft.status = status.unwrap_or_default();
            let task = client.create_task(draft).await?;
            print_saved(client, &task, out).await?;
        }
        Command::List { json } => {
            let tasks = client.list_tasks().await;
            if json {
                serde_json::to_writer_pretty(&mut *out, &tasks)
                    .map_err(|e| CliError::Io(e.into()))?;
                writeln!(out)?;
            } else {
                let pending = client.pending_task_ids().await;
                if tasks.is_empty() {
                    writeln!(out, "no tasks")?;
                }
                for task in &tasks {
                    writeln!(out, "{}", task_line(task, &pending))?;
                }
            }
        }
        Command::Edit {
            id,
            title,
            description,
        } => {
            let patch = TaskPatch {
                title,
                description,
                status: None,
            };
            if patch.is_empty() {
                return Err(CliError::EmptyEdit);
            }
            let task = client.update_task(&id, patch).await?;
            print_saved(client, &task, out).await?;
        }
        Command::Status { id, status } => {
            let task = client.set_status(&id, status).await?;
            print_saved(client, &task, out).await?;
        }
        Command::Rm { id } => {
            client.delete_task(&id).await?;
            writeln!(out, "deleted {id}")?;
            print_pending(client, out).await?;
        }
        Command::Sync => match client.sync().await {
            Ok(PassOutcome::Offline) => {
                writeln!(out, "offline")?;
                print_pending(client, out).await?;
            }
            Ok(PassOutcome::Idle) => writeln!(out, "nothing to sync")?,
            Ok(PassOutcome::AlreadyRunning) => writeln!(out, "a sync is already running")?,
            Ok(PassOutcome::Completed(report)) => writeln!(
                out,
                "synced: {} created, {} updated, {} deleted, {} discarded",
                report.created.len(),
                report.updated.len(),
                report.deleted.len(),
                report.discarded.len()
            )?,
            Err(err) => {
                tracing::warn!(error = %err, "sync stopped");
                writeln!(out, "sync stopped: {err}")?;
                print_pending(client, out).await?;
            }
        },
        Command::Pending => {
            let ops = client.pending_ops().await;
            if ops.is_empty() {
                writeln!(out, "nothing pending")?;
            }
            for op in &ops {
                writeln!(out, "{}", pending_line(op))?;
            }
        }
        Command::Refresh => {
            if client.refresh().await? {
                writeln!(out, "refreshed {} task(s)", client.list_tasks().await.len())?;
            } else {
                writeln!(out, "offline, keeping cached tasks")?;
            }
        }
    }
    Ok(())
}

async fn print_saved(client: &TaskClient, task: &Task, out: &mut dyn Write) -> Result<()> {
    let pending = client.pending_task_ids().await;
    writeln!(out, "{}", task_line(task, &pending))?;
    Ok(())
}

async fn print_pending(client: &TaskClient, out: &mut dyn Write) -> Result<()> {
    let count = client.pending_count().await;
    if count > 0 {
        writeln!(out, "{count} operation(s) still pending")?;
    }
    Ok(())
}

fn task_line(task: &Task, pending: &HashSet<String>) -> String {
    let marker = if task.is_pending_assignment() || pending.contains(&task.id) {
        '*'
    } else {
        ' '
    };
    format!(
        "{marker} {:<12} {:<11} {}",
        task.id,
        task.status.as_str(),
        task.title
    )
}

fn pending_line(op: &PendingOp) -> String {
    format!(
        "{:<6} {:<12} server={} at={}",
        op.kind.to_string(),
        op.client_ref,
        op.server_ref.as_deref().unwrap_or("-"),
        op.enqueued_at
    )
}
