//! Local task and event tables. These hold the flattened, typed
//! projections of synchronized items; the raw envelopes only live in the
//! outbox and on the server.

use sqlx::SqliteConnection;

use crate::models::date::parse_date;
use crate::models::{Event, Recur, Task};

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    title: String,
    project: String,
    date: Option<String>,
    recurrer: Option<String>,
    recur_next: Option<String>,
}

impl TaskRow {
    fn into_task(self) -> Task {
        Task {
            id: self.id,
            title: self.title,
            project: self.project,
            date: self.date.as_deref().and_then(parse_date),
            recurrer: self.recurrer.as_deref().and_then(Recur::parse),
            recur_next: self.recur_next.as_deref().and_then(parse_date),
        }
    }
}

pub async fn store_task(conn: &mut SqliteConnection, task: &Task) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO tasks (id, title, project, date, recurrer, recur_next)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
         title = excluded.title,
         project = excluded.project,
         date = excluded.date,
         recurrer = excluded.recurrer,
         recur_next = excluded.recur_next",
    )
    .bind(&task.id)
    .bind(&task.title)
    .bind(&task.project)
    .bind(task.date.map(|d| d.to_string()))
    .bind(task.recurrer.as_ref().map(|r| r.to_string()))
    .bind(task.recur_next.map(|d| d.to_string()))
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn find_task(conn: &mut SqliteConnection, id: &str) -> Result<Task, sqlx::Error> {
    let row: Option<TaskRow> = sqlx::query_as(
        "SELECT id, title, project, date, recurrer, recur_next FROM tasks WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;

    row.map(TaskRow::into_task).ok_or(sqlx::Error::RowNotFound)
}

pub async fn find_all_tasks(conn: &mut SqliteConnection) -> Result<Vec<Task>, sqlx::Error> {
    let rows: Vec<TaskRow> = sqlx::query_as(
        "SELECT id, title, project, date, recurrer, recur_next FROM tasks ORDER BY date, title",
    )
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(TaskRow::into_task).collect())
}

pub async fn delete_task(conn: &mut SqliteConnection, id: &str) -> Result<(), sqlx::Error> {
    let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(sqlx::Error::RowNotFound);
    }

    Ok(())
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    title: String,
    date: Option<String>,
    time: Option<String>,
    duration_min: Option<i64>,
}

impl EventRow {
    fn into_event(self) -> Event {
        Event {
            id: self.id,
            title: self.title,
            date: self.date.as_deref().and_then(parse_date),
            time: self
                .time
                .as_deref()
                .and_then(|t| chrono::NaiveTime::parse_from_str(t, "%H:%M").ok()),
            duration_min: self.duration_min.map(|m| m as u32),
        }
    }
}

pub async fn store_event(
    conn: &mut SqliteConnection,
    event: &Event,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO events (id, title, date, time, duration_min)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
         title = excluded.title,
         date = excluded.date,
         time = excluded.time,
         duration_min = excluded.duration_min",
    )
    .bind(&event.id)
    .bind(&event.title)
    .bind(event.date.map(|d| d.to_string()))
    .bind(event.time.map(|t| t.format("%H:%M").to_string()))
    .bind(event.duration_min.map(i64::from))
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn find_all_events(conn: &mut SqliteConnection) -> Result<Vec<Event>, sqlx::Error> {
    let rows: Vec<EventRow> = sqlx::query_as(
        "SELECT id, title, date, time, duration_min FROM events ORDER BY date, time",
    )
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(EventRow::into_event).collect())
}

pub async fn delete_event(conn: &mut SqliteConnection, id: &str) -> Result<(), sqlx::Error> {
    let result = sqlx::query("DELETE FROM events WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(sqlx::Error::RowNotFound);
    }

    Ok(())
}
