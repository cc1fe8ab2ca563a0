use clap::{Args, Subcommand};
use sqlx::SqlitePool;

use crate::db::{item_repo, localid_repo, sync_repo};
use crate::models::date::{parse_date, today};
use crate::models::{Recur, Task};

#[derive(Args)]
pub struct TaskCommand {
    #[command(subcommand)]
    pub command: TaskSubcommand,
}

#[derive(Subcommand)]
pub enum TaskSubcommand {
    /// Create a new task
    Add {
        /// Title of the task
        title: String,

        /// Project the task belongs to
        #[arg(long, short)]
        project: Option<String>,

        /// Date: yyyy-mm-dd, "today"/"tod", "tomorrow"/"tom" or a weekday name
        #[arg(long, short)]
        date: Option<String>,

        /// Recurrence rule, e.g. "daily", "every 3 days", "weekly, monday & thursday"
        #[arg(long, short)]
        recur: Option<String>,
    },

    /// List all tasks
    List {
        /// Only show tasks in this project
        #[arg(long, short)]
        project: Option<String>,
    },

    /// Update an existing task
    Update {
        /// Local id as shown by `task list`
        local_id: i64,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New project
        #[arg(long)]
        project: Option<String>,

        /// New date; "no-date" clears it
        #[arg(long)]
        date: Option<String>,

        /// New recurrence rule; an empty string clears it
        #[arg(long)]
        recur: Option<String>,
    },

    /// Delete a task
    Delete {
        /// Local id as shown by `task list`
        local_id: i64,
    },
}

impl TaskCommand {
    pub async fn run(&self, pool: &SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            TaskSubcommand::Add {
                title,
                project,
                date,
                recur,
            } => add(pool, title, project.as_deref(), date.as_deref(), recur.as_deref()).await,
            TaskSubcommand::List { project } => list(pool, project.as_deref()).await,
            TaskSubcommand::Update {
                local_id,
                title,
                project,
                date,
                recur,
            } => {
                update(
                    pool,
                    *local_id,
                    title.as_deref(),
                    project.as_deref(),
                    date.as_deref(),
                    recur.as_deref(),
                )
                .await
            }
            TaskSubcommand::Delete { local_id } => delete(pool, *local_id).await,
        }
    }
}

/// Parses a recurrence flag. `Some("")` clears the rule; anything else
/// must be a valid rule text, with a bare variant ("daily") anchored at
/// today.
fn parse_recur_flag(input: &str) -> Result<Option<Recur>, Box<dyn std::error::Error>> {
    if input.is_empty() {
        return Ok(None);
    }

    let rule = Recur::parse(input)
        .or_else(|| Recur::parse(&format!("{}, {}", today(), input)))
        .ok_or_else(|| format!("Invalid recurrence rule: '{}'", input))?;

    Ok(Some(rule))
}

async fn add(
    pool: &SqlitePool,
    title: &str,
    project: Option<&str>,
    date: Option<&str>,
    recur: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    if title.trim().is_empty() {
        return Err("Task title cannot be empty".into());
    }

    let mut task = Task::new(title.trim());
    if let Some(project) = project {
        task.project = project.to_string();
    }
    if let Some(date) = date {
        task.date = parse_date(date);
        if task.date.is_none() {
            return Err(format!("Invalid date: '{}'", date).into());
        }
    }
    if let Some(recur) = recur {
        task.recurrer = parse_recur_flag(recur)?;
        task.recur_next = task.recurrer.as_ref().map(|r| r.first());
    }

    let mut tx = pool.begin().await?;
    item_repo::store_task(&mut tx, &task).await?;
    let local_id = localid_repo::next(&mut tx).await?;
    localid_repo::store(&mut tx, &task.id, local_id).await?;
    sync_repo::outbox_store(&mut tx, &task.clone().into_item()).await?;
    tx.commit().await?;

    println!("Created task {}: {}", local_id, task.title);

    Ok(())
}

async fn list(
    pool: &SqlitePool,
    project: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = pool.acquire().await?;

    let tasks = item_repo::find_all_tasks(&mut conn).await?;
    let local_ids = localid_repo::find_all(&mut conn).await?;

    let mut shown = 0;
    for task in &tasks {
        if let Some(project) = project {
            if task.project != project {
                continue;
            }
        }
        shown += 1;

        let local_id = local_ids
            .get(&task.id)
            .map(|l| l.to_string())
            .unwrap_or_else(|| "-".to_string());
        let date = task
            .date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "no date".to_string());
        let recur_marker = if task.recurrer.is_some() { " (r)" } else { "" };

        if task.project.is_empty() {
            println!("{:>4}  {:<10}  {}{}", local_id, date, task.title, recur_marker);
        } else {
            println!(
                "{:>4}  {:<10}  [{}] {}{}",
                local_id, date, task.project, task.title, recur_marker
            );
        }
    }

    if shown == 0 {
        println!("No tasks.");
    }

    Ok(())
}

async fn update(
    pool: &SqlitePool,
    local_id: i64,
    title: Option<&str>,
    project: Option<&str>,
    date: Option<&str>,
    recur: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut tx = pool.begin().await?;

    let id = match localid_repo::find_one(&mut tx, local_id).await {
        Ok(id) => id,
        Err(sqlx::Error::RowNotFound) => {
            return Err(format!("No task with local id {}", local_id).into());
        }
        Err(e) => return Err(e.into()),
    };
    let mut task = item_repo::find_task(&mut tx, &id).await?;

    if let Some(title) = title {
        if title.trim().is_empty() {
            return Err("Task title cannot be empty".into());
        }
        task.title = title.trim().to_string();
    }
    if let Some(project) = project {
        task.project = project.to_string();
    }
    if let Some(date) = date {
        task.date = parse_date(date);
        if task.date.is_none() && date != "no-date" && date != "no date" && !date.is_empty() {
            return Err(format!("Invalid date: '{}'", date).into());
        }
    }
    if let Some(recur) = recur {
        task.recurrer = parse_recur_flag(recur)?;
        task.recur_next = task.recurrer.as_ref().map(|r| r.first());
    }

    item_repo::store_task(&mut tx, &task).await?;
    sync_repo::outbox_store(&mut tx, &task.clone().into_item()).await?;
    tx.commit().await?;

    println!("Updated task {}: {}", local_id, task.title);

    Ok(())
}

async fn delete(pool: &SqlitePool, local_id: i64) -> Result<(), Box<dyn std::error::Error>> {
    let mut tx = pool.begin().await?;

    let id = match localid_repo::find_one(&mut tx, local_id).await {
        Ok(id) => id,
        Err(sqlx::Error::RowNotFound) => {
            return Err(format!("No task with local id {}", local_id).into());
        }
        Err(e) => return Err(e.into()),
    };
    let task = item_repo::find_task(&mut tx, &id).await?;

    // Queue the tombstone before dropping the local rows, so the deletion
    // reaches other replicas on the next sync.
    let mut tombstone = task.clone().into_item();
    tombstone.deleted = true;
    sync_repo::outbox_store(&mut tx, &tombstone).await?;

    item_repo::delete_task(&mut tx, &id).await?;
    localid_repo::delete(&mut tx, &id).await?;
    tx.commit().await?;

    println!("Deleted task {}: {}", local_id, task.title);

    Ok(())
}
