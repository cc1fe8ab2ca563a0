//! Outbox and sync cursor: the client-side bookkeeping for the
//! reconciler.
//!
//! The outbox holds full serialized envelopes of local edits that have
//! not been confirmed delivered; the cursor is the highest server
//! timestamp merged so far, stored as unix microseconds.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::models::Item;

/// Queues an envelope for the next push, replacing any pending envelope
/// for the same item.
pub async fn outbox_store(
    conn: &mut SqliteConnection,
    item: &Item,
) -> Result<(), sqlx::Error> {
    let encoded = serde_json::to_string(item)
        .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

    sqlx::query(
        "INSERT INTO outbox (id, item) VALUES (?, ?)
         ON CONFLICT(id) DO UPDATE SET item = excluded.item",
    )
    .bind(&item.id)
    .bind(encoded)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn outbox_all(conn: &mut SqliteConnection) -> Result<Vec<Item>, sqlx::Error> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT item FROM outbox ORDER BY id")
        .fetch_all(conn)
        .await?;

    let mut items = Vec::with_capacity(rows.len());
    for (encoded,) in rows {
        let item: Item = serde_json::from_str(&encoded)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        items.push(item);
    }

    Ok(items)
}

pub async fn outbox_clear(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM outbox").execute(conn).await?;

    Ok(())
}

/// The merge watermark; `None` when this replica has never synced.
pub async fn last_update(
    conn: &mut SqliteConnection,
) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    let row: (Option<i64>,) =
        sqlx::query_as("SELECT last_update FROM sync_cursor WHERE id = 1")
            .fetch_one(conn)
            .await?;

    Ok(row.0.and_then(DateTime::from_timestamp_micros))
}

pub async fn set_last_update(
    conn: &mut SqliteConnection,
    ts: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE sync_cursor SET last_update = ? WHERE id = 1")
        .bind(ts.timestamp_micros())
        .execute(conn)
        .await?;

    Ok(())
}
