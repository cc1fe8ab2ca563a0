//! Authoritative item store for the sync server.
//!
//! One SQLite table of item envelopes keyed by id. The store stamps
//! `updated` on every write and keeps tombstones forever so deletions
//! reach every replica. Timestamps are persisted as unix microseconds so
//! the `updated >= since` pull filter is exact.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use uuid::Uuid;

use crate::models::date::parse_date;
use crate::models::{Item, Kind, Recur};

#[derive(Debug)]
pub enum StorageError {
    Database(sqlx::Error),
    Migration(sqlx::migrate::MigrateError),
    /// A row holds a kind tag this build does not know.
    UnknownKind(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Database(e) => write!(f, "database error: {}", e),
            StorageError::Migration(e) => write!(f, "migration error: {}", e),
            StorageError::UnknownKind(k) => write!(f, "unknown item kind: {}", k),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Database(e) => Some(e),
            StorageError::Migration(e) => Some(e),
            StorageError::UnknownKind(_) => None,
        }
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        StorageError::Database(e)
    }
}

impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        StorageError::Migration(e)
    }
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: String,
    kind: String,
    updated: i64,
    deleted: bool,
    date: Option<String>,
    recurrer: Option<String>,
    recur_next: Option<String>,
    body: String,
}

impl ItemRow {
    fn into_item(self) -> Result<Item, StorageError> {
        let kind = Kind::parse(&self.kind).ok_or(StorageError::UnknownKind(self.kind))?;

        Ok(Item {
            id: self.id,
            kind,
            updated: DateTime::from_timestamp_micros(self.updated),
            deleted: self.deleted,
            date: self.date.as_deref().and_then(parse_date),
            recurrer: self.recurrer.as_deref().and_then(Recur::parse),
            recur_next: self.recur_next.as_deref().and_then(parse_date),
            body: self.body,
        })
    }
}

const SELECT_ITEM: &str =
    "SELECT id, kind, updated, deleted, date, recurrer, recur_next, body FROM items";

#[derive(Clone)]
pub struct ItemStore {
    pool: SqlitePool,
}

impl ItemStore {
    pub async fn open(db_path: PathBuf) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
        let options = SqliteConnectOptions::from_str(&db_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./server_migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Upserts an envelope, stamping `updated = ts`. A recurring item
    /// arriving without a cursor gets one derived from its rule, so the
    /// scheduler always has a starting point.
    pub async fn update(&self, item: &Item, ts: DateTime<Utc>) -> Result<(), StorageError> {
        let recur_next = match (&item.recurrer, item.recur_next) {
            (Some(rule), None) => Some(rule.first()),
            (_, next) => next,
        };

        sqlx::query(
            "INSERT INTO items (id, kind, updated, deleted, date, recurrer, recur_next, body)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
             kind = excluded.kind,
             updated = excluded.updated,
             deleted = excluded.deleted,
             date = excluded.date,
             recurrer = excluded.recurrer,
             recur_next = excluded.recur_next,
             body = excluded.body",
        )
        .bind(&item.id)
        .bind(item.kind.as_str())
        .bind(ts.timestamp_micros())
        .bind(item.deleted)
        .bind(item.date.map(|d| d.to_string()))
        .bind(item.recurrer.as_ref().map(|r| r.to_string()))
        .bind(recur_next.map(|d| d.to_string()))
        .bind(&item.body)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Every item of the requested kinds (all kinds when empty) whose
    /// stamp is at or after `since`, tombstones included. The boundary is
    /// inclusive so two items sharing a timestamp can never be skipped;
    /// re-merging the boundary item is idempotent on the client.
    pub async fn updated(
        &self,
        kinds: &[Kind],
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Item>, StorageError> {
        let mut sql = String::from(SELECT_ITEM);
        let mut clauses: Vec<String> = Vec::new();
        if since.is_some() {
            clauses.push("updated >= ?".to_string());
        }
        if !kinds.is_empty() {
            let marks = vec!["?"; kinds.len()].join(", ");
            clauses.push(format!("kind IN ({})", marks));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY updated");

        let mut query = sqlx::query_as::<_, ItemRow>(&sql);
        if let Some(ts) = since {
            query = query.bind(ts.timestamp_micros());
        }
        for kind in kinds {
            query = query.bind(kind.as_str());
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(ItemRow::into_item).collect()
    }

    /// Non-deleted recurring items whose cursor is due at or before
    /// `horizon`.
    pub async fn should_recur(&self, horizon: NaiveDate) -> Result<Vec<Item>, StorageError> {
        let sql = format!(
            "{} WHERE deleted = 0 AND recurrer IS NOT NULL AND recur_next <= ? ORDER BY id",
            SELECT_ITEM
        );
        let rows = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(horizon.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(ItemRow::into_item).collect()
    }

    /// Materializes one occurrence of a recurring item and advances its
    /// cursor in the same transaction, so a crash in between cannot
    /// double-spawn. Returns the spawned instance.
    pub async fn spawn_occurrence(
        &self,
        original: &Item,
        date: NaiveDate,
        next: NaiveDate,
        ts: DateTime<Utc>,
    ) -> Result<Item, StorageError> {
        let instance = Item {
            id: Uuid::new_v4().to_string(),
            kind: original.kind,
            updated: Some(ts),
            deleted: false,
            date: Some(date),
            recurrer: None,
            recur_next: None,
            body: original.body.clone(),
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO items (id, kind, updated, deleted, date, recurrer, recur_next, body)
             VALUES (?, ?, ?, 0, ?, NULL, NULL, ?)",
        )
        .bind(&instance.id)
        .bind(instance.kind.as_str())
        .bind(ts.timestamp_micros())
        .bind(date.to_string())
        .bind(&instance.body)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE items SET recur_next = ?, updated = ? WHERE id = ?")
            .bind(next.to_string())
            .bind(ts.timestamp_micros())
            .bind(&original.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(instance)
    }
}
