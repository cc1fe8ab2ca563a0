use clap::{Args, Subcommand};
use sqlx::SqlitePool;

use crate::db::{item_repo, localid_repo, sync_repo};
use crate::models::date::parse_date;
use crate::models::Event;

#[derive(Args)]
pub struct EventCommand {
    #[command(subcommand)]
    pub command: EventSubcommand,
}

#[derive(Subcommand)]
pub enum EventSubcommand {
    /// Create a new event
    Add {
        /// Title of the event
        title: String,

        /// Date: yyyy-mm-dd, "today"/"tod", "tomorrow"/"tom" or a weekday name
        #[arg(long, short)]
        date: String,

        /// Start time, hh:mm
        #[arg(long, short)]
        time: Option<String>,

        /// Duration in minutes
        #[arg(long)]
        duration: Option<u32>,
    },

    /// List all events
    List,

    /// Delete an event
    Delete {
        /// Local id as shown by `event list`
        local_id: i64,
    },
}

impl EventCommand {
    pub async fn run(&self, pool: &SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            EventSubcommand::Add {
                title,
                date,
                time,
                duration,
            } => add(pool, title, date, time.as_deref(), *duration).await,
            EventSubcommand::List => list(pool).await,
            EventSubcommand::Delete { local_id } => delete(pool, *local_id).await,
        }
    }
}

async fn add(
    pool: &SqlitePool,
    title: &str,
    date: &str,
    time: Option<&str>,
    duration_min: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    if title.trim().is_empty() {
        return Err("Event title cannot be empty".into());
    }

    let date = parse_date(date).ok_or_else(|| format!("Invalid date: '{}'", date))?;
    let time = match time {
        Some(t) => Some(
            chrono::NaiveTime::parse_from_str(t, "%H:%M")
                .map_err(|_| format!("Invalid time: '{}'", t))?,
        ),
        None => None,
    };

    let event = Event {
        id: uuid::Uuid::new_v4().to_string(),
        date: Some(date),
        title: title.trim().to_string(),
        time,
        duration_min,
    };

    let mut tx = pool.begin().await?;
    item_repo::store_event(&mut tx, &event).await?;
    let local_id = localid_repo::next(&mut tx).await?;
    localid_repo::store(&mut tx, &event.id, local_id).await?;
    sync_repo::outbox_store(&mut tx, &event.clone().into_item()).await?;
    tx.commit().await?;

    println!("Created event {}: {}", local_id, event.title);

    Ok(())
}

async fn list(pool: &SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = pool.acquire().await?;

    let events = item_repo::find_all_events(&mut conn).await?;
    let local_ids = localid_repo::find_all(&mut conn).await?;

    if events.is_empty() {
        println!("No events.");
        return Ok(());
    }

    for event in &events {
        let local_id = local_ids
            .get(&event.id)
            .map(|l| l.to_string())
            .unwrap_or_else(|| "-".to_string());
        let date = event
            .date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "no date".to_string());
        let time = event
            .time
            .map(|t| t.format("%H:%M").to_string())
            .unwrap_or_else(|| "     ".to_string());

        match event.duration_min {
            Some(minutes) => println!(
                "{:>4}  {:<10}  {}  {} ({} min)",
                local_id, date, time, event.title, minutes
            ),
            None => println!("{:>4}  {:<10}  {}  {}", local_id, date, time, event.title),
        }
    }

    Ok(())
}

async fn delete(pool: &SqlitePool, local_id: i64) -> Result<(), Box<dyn std::error::Error>> {
    let mut tx = pool.begin().await?;

    let id = match localid_repo::find_one(&mut tx, local_id).await {
        Ok(id) => id,
        Err(sqlx::Error::RowNotFound) => {
            return Err(format!("No event with local id {}", local_id).into());
        }
        Err(e) => return Err(e.into()),
    };

    let events = item_repo::find_all_events(&mut tx).await?;
    let event = events
        .into_iter()
        .find(|e| e.id == id)
        .ok_or_else(|| format!("No event with local id {}", local_id))?;

    let mut tombstone = event.clone().into_item();
    tombstone.deleted = true;
    sync_repo::outbox_store(&mut tx, &tombstone).await?;

    item_repo::delete_event(&mut tx, &id).await?;
    localid_repo::delete(&mut tx, &id).await?;
    tx.commit().await?;

    println!("Deleted event {}: {}", local_id, event.title);

    Ok(())
}
