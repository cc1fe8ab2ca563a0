//! Local replica storage: tasks, events, local ids, the outbox and the
//! sync cursor, all in one SQLite database.
//!
//! Repository functions take a `&mut SqliteConnection` instead of a pool
//! so the caller decides the transaction boundary; the reconciler runs an
//! entire sync pass inside a single transaction.

pub mod item_repo;
pub mod localid_repo;
pub mod sync_repo;

pub use localid_repo::next_local_id;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::PathBuf;
use std::str::FromStr;

/// Initialize the client database connection pool and run migrations.
pub async fn init_db(db_path: PathBuf) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| sqlx::Error::Io(e))?;
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;
    use tempfile::TempDir;

    /// A fresh migrated database in a temp dir; the dir must stay alive
    /// for the duration of the test.
    pub async fn test_db() -> (TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_db(dir.path().join("test.db")).await.unwrap();
        (dir, pool)
    }
}
