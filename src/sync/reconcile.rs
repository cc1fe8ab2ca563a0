//! The client-side reconciler: one all-or-nothing sync pass.
//!
//! Push the outbox, pull everything newer than the cursor, merge into the
//! local replica, advance the cursor. Every local mutation happens inside
//! a single transaction; if anything fails the replica is untouched and
//! the pass can simply be re-run.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::db::{item_repo, localid_repo, sync_repo};
use crate::models::{BodyError, Event, Item, Kind, Task, SYNCED_KINDS};
use crate::sync::client::{Transport, TransportError};

#[derive(Debug)]
pub enum SyncError {
    Transport(TransportError),
    Storage(sqlx::Error),
    /// A received body failed to decode for its kind; the whole pass is
    /// rolled back, no partial merge.
    Body { id: String, source: BodyError },
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Transport(e) => write!(f, "transport error: {}", e),
            SyncError::Storage(e) => write!(f, "storage error: {}", e),
            SyncError::Body { id, source } => {
                write!(f, "invalid body on item {}: {}", id, source)
            }
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Transport(e) => Some(e),
            SyncError::Storage(e) => Some(e),
            SyncError::Body { source, .. } => Some(source),
        }
    }
}

impl From<TransportError> for SyncError {
    fn from(e: TransportError) -> Self {
        SyncError::Transport(e)
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(e: sqlx::Error) -> Self {
        SyncError::Storage(e)
    }
}

/// What a sync pass did, for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub pushed: usize,
    pub received: usize,
    pub merged: usize,
    pub deleted: usize,
}

/// Runs one reconciler pass against `transport`.
///
/// Safe to re-run after any failure: the push is an idempotent upsert on
/// the server side and the merge commits atomically or not at all.
pub async fn sync_once<T: Transport>(
    pool: &sqlx::SqlitePool,
    transport: &T,
) -> Result<SyncReport, SyncError> {
    let mut report = SyncReport::default();
    let mut tx = pool.begin().await?;

    // Push. A transport failure here aborts the pass before any local
    // mutation; the outbox row deletion below only lands with the commit.
    let outbox = sync_repo::outbox_all(&mut tx).await?;
    if !outbox.is_empty() {
        transport.update(&outbox).await?;
        sync_repo::outbox_clear(&mut tx).await?;
        report.pushed = outbox.len();
        tracing::debug!(count = report.pushed, "pushed outbox");
    }

    // Pull.
    let since = sync_repo::last_update(&mut tx).await?;
    let received = transport.updated(&SYNCED_KINDS, since).await?;
    report.received = received.len();

    // Merge.
    let mut max_updated: Option<DateTime<Utc>> = None;
    for item in &received {
        if item.updated > max_updated {
            max_updated = item.updated;
        }

        if item.deleted {
            ignore_not_found(localid_repo::delete(&mut tx, &item.id).await)?;
            match item.kind {
                Kind::Task => ignore_not_found(item_repo::delete_task(&mut tx, &item.id).await)?,
                Kind::Event => {
                    ignore_not_found(item_repo::delete_event(&mut tx, &item.id).await)?
                }
                Kind::Schedule => {}
            }
            report.deleted += 1;
            continue;
        }

        match item.kind {
            Kind::Task => {
                let task = Task::from_item(item).map_err(|source| SyncError::Body {
                    id: item.id.clone(),
                    source,
                })?;
                item_repo::store_task(&mut tx, &task).await?;
            }
            Kind::Event => {
                let event = Event::from_item(item).map_err(|source| SyncError::Body {
                    id: item.id.clone(),
                    source,
                })?;
                item_repo::store_event(&mut tx, &event).await?;
            }
            // Schedules stay server-side; clients never materialize them.
            Kind::Schedule => continue,
        }

        assign_local_id(&mut tx, item).await?;
        report.merged += 1;
    }

    // Commit the cursor only when something was received; an empty pull
    // never resets or regresses it.
    if !received.is_empty() {
        if let Some(ts) = max_updated {
            sync_repo::set_last_update(&mut tx, ts).await?;
        }
    }

    tx.commit().await?;
    tracing::info!(
        pushed = report.pushed,
        received = report.received,
        merged = report.merged,
        deleted = report.deleted,
        "sync pass complete"
    );

    Ok(report)
}

/// Gives a newly-seen item a local id. Existing mappings are never
/// reassigned.
async fn assign_local_id(
    tx: &mut sqlx::SqliteConnection,
    item: &Item,
) -> Result<(), SyncError> {
    match localid_repo::find(tx, &item.id).await {
        Ok(_) => Ok(()),
        Err(sqlx::Error::RowNotFound) => {
            let local_id = localid_repo::next(tx).await?;
            localid_repo::store(tx, &item.id, local_id).await?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn ignore_not_found(result: Result<(), sqlx::Error>) -> Result<(), SyncError> {
    match result {
        Ok(()) | Err(sqlx::Error::RowNotFound) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_util::test_db;
    use crate::models::Recur;
    use chrono::TimeZone;
    use std::sync::Mutex;

    /// In-memory stand-in for the server: answers pulls from a canned
    /// item list and records pushes.
    #[derive(Default)]
    struct MemoryTransport {
        items: Mutex<Vec<Item>>,
        pushes: Mutex<Vec<Vec<Item>>>,
        fail_push: bool,
        fail_pull: bool,
    }

    impl MemoryTransport {
        fn with_items(items: Vec<Item>) -> Self {
            Self {
                items: Mutex::new(items),
                ..Default::default()
            }
        }
    }

    impl Transport for MemoryTransport {
        async fn update(&self, items: &[Item]) -> Result<(), TransportError> {
            if self.fail_push {
                return Err(TransportError::Status(500, "boom".to_string()));
            }
            self.pushes.lock().unwrap().push(items.to_vec());
            Ok(())
        }

        async fn updated(
            &self,
            kinds: &[Kind],
            since: Option<DateTime<Utc>>,
        ) -> Result<Vec<Item>, TransportError> {
            if self.fail_pull {
                return Err(TransportError::Status(500, "boom".to_string()));
            }
            Ok(self
                .items
                .lock()
                .unwrap()
                .iter()
                .filter(|i| kinds.contains(&i.kind))
                .filter(|i| since.is_none() || i.updated >= since)
                .cloned()
                .collect())
        }
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn remote_task(id: &str, title: &str, updated: DateTime<Utc>) -> Item {
        let mut task = Task::new(title);
        task.id = id.to_string();
        let mut item = task.into_item();
        item.updated = Some(updated);
        item
    }

    #[tokio::test]
    async fn test_merge_stores_tasks_and_assigns_local_ids() {
        let (_dir, pool) = test_db().await;
        let transport = MemoryTransport::with_items(vec![
            remote_task("a", "one", ts(100)),
            remote_task("b", "two", ts(200)),
        ]);

        let report = sync_once(&pool, &transport).await.unwrap();
        assert_eq!(report.received, 2);
        assert_eq!(report.merged, 2);

        let mut conn = pool.acquire().await.unwrap();
        let tasks = item_repo::find_all_tasks(&mut conn).await.unwrap();
        assert_eq!(tasks.len(), 2);

        let lids = localid_repo::find_all(&mut conn).await.unwrap();
        let mut values: Vec<i64> = lids.values().copied().collect();
        values.sort();
        assert_eq!(values, vec![1, 2]);

        assert_eq!(
            sync_repo::last_update(&mut conn).await.unwrap(),
            Some(ts(200))
        );
    }

    #[tokio::test]
    async fn test_push_sends_outbox_and_clears_it() {
        let (_dir, pool) = test_db().await;
        let transport = MemoryTransport::default();

        let item = Task::new("local edit").into_item();
        {
            let mut conn = pool.acquire().await.unwrap();
            sync_repo::outbox_store(&mut conn, &item).await.unwrap();
        }

        let report = sync_once(&pool, &transport).await.unwrap();
        assert_eq!(report.pushed, 1);

        let pushes = transport.pushes.lock().unwrap();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0], vec![item]);
        drop(pushes);

        let mut conn = pool.acquire().await.unwrap();
        assert!(sync_repo::outbox_all(&mut conn).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_push_failure_leaves_replica_untouched() {
        let (_dir, pool) = test_db().await;
        let transport = MemoryTransport {
            fail_push: true,
            items: Mutex::new(vec![remote_task("a", "one", ts(100))]),
            ..Default::default()
        };

        let item = Task::new("local edit").into_item();
        {
            let mut conn = pool.acquire().await.unwrap();
            sync_repo::outbox_store(&mut conn, &item).await.unwrap();
        }

        assert!(matches!(
            sync_once(&pool, &transport).await,
            Err(SyncError::Transport(_))
        ));

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(sync_repo::outbox_all(&mut conn).await.unwrap().len(), 1);
        assert!(item_repo::find_all_tasks(&mut conn).await.unwrap().is_empty());
        assert_eq!(sync_repo::last_update(&mut conn).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_pull_failure_after_push_keeps_outbox_queued() {
        // The push succeeded remotely, but the local outbox clear rolls
        // back with the failed pass; re-pushing later is a harmless
        // idempotent upsert.
        let (_dir, pool) = test_db().await;
        let transport = MemoryTransport {
            fail_pull: true,
            ..Default::default()
        };

        let item = Task::new("local edit").into_item();
        {
            let mut conn = pool.acquire().await.unwrap();
            sync_repo::outbox_store(&mut conn, &item).await.unwrap();
        }

        assert!(sync_once(&pool, &transport).await.is_err());

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(sync_repo::outbox_all(&mut conn).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_tombstone_removes_task_and_local_id() {
        let (_dir, pool) = test_db().await;

        let live = remote_task("a", "one", ts(100));
        let transport = MemoryTransport::with_items(vec![live.clone()]);
        sync_once(&pool, &transport).await.unwrap();

        let mut dead = live;
        dead.deleted = true;
        dead.updated = Some(ts(300));
        *transport.items.lock().unwrap() = vec![dead];

        let report = sync_once(&pool, &transport).await.unwrap();
        assert_eq!(report.deleted, 1);

        let mut conn = pool.acquire().await.unwrap();
        assert!(item_repo::find_all_tasks(&mut conn).await.unwrap().is_empty());
        assert!(localid_repo::find_all(&mut conn).await.unwrap().is_empty());
        assert_eq!(
            sync_repo::last_update(&mut conn).await.unwrap(),
            Some(ts(300))
        );
    }

    #[tokio::test]
    async fn test_tombstone_for_never_seen_item_is_a_noop() {
        let (_dir, pool) = test_db().await;
        let mut dead = remote_task("ghost", "gone", ts(50));
        dead.deleted = true;
        let transport = MemoryTransport::with_items(vec![dead]);

        let report = sync_once(&pool, &transport).await.unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(report.merged, 0);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let (_dir, pool) = test_db().await;
        let transport = MemoryTransport::with_items(vec![
            remote_task("a", "one", ts(100)),
            remote_task("b", "two", ts(200)),
        ]);

        sync_once(&pool, &transport).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let tasks_before = item_repo::find_all_tasks(&mut conn).await.unwrap();
        let lids_before = localid_repo::find_all(&mut conn).await.unwrap();
        let cursor_before = sync_repo::last_update(&mut conn).await.unwrap();
        drop(conn);

        sync_once(&pool, &transport).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(item_repo::find_all_tasks(&mut conn).await.unwrap(), tasks_before);
        assert_eq!(localid_repo::find_all(&mut conn).await.unwrap(), lids_before);
        assert_eq!(sync_repo::last_update(&mut conn).await.unwrap(), cursor_before);
        assert!(sync_repo::outbox_all(&mut conn).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_pull_leaves_cursor_unchanged() {
        let (_dir, pool) = test_db().await;
        {
            let mut conn = pool.acquire().await.unwrap();
            sync_repo::set_last_update(&mut conn, ts(500)).await.unwrap();
        }

        let transport = MemoryTransport::default();
        let report = sync_once(&pool, &transport).await.unwrap();
        assert_eq!(report.received, 0);

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(
            sync_repo::last_update(&mut conn).await.unwrap(),
            Some(ts(500))
        );
    }

    #[tokio::test]
    async fn test_malformed_body_aborts_without_partial_merge() {
        let (_dir, pool) = test_db().await;

        let good = remote_task("a", "one", ts(100));
        let mut bad = Item::new(Kind::Task, "not json".to_string());
        bad.id = "b".to_string();
        bad.updated = Some(ts(200));
        let transport = MemoryTransport::with_items(vec![good, bad]);

        assert!(matches!(
            sync_once(&pool, &transport).await,
            Err(SyncError::Body { .. })
        ));

        // The good item that merged before the bad one rolled back too.
        let mut conn = pool.acquire().await.unwrap();
        assert!(item_repo::find_all_tasks(&mut conn).await.unwrap().is_empty());
        assert!(localid_repo::find_all(&mut conn).await.unwrap().is_empty());
        assert_eq!(sync_repo::last_update(&mut conn).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_merged_recurring_task_keeps_rule() {
        let (_dir, pool) = test_db().await;

        let mut task = Task::new("water plants");
        task.id = "r1".to_string();
        task.recurrer = Recur::parse("2024-01-01, daily");
        task.recur_next = task.recurrer.as_ref().map(|r| r.first());
        let mut item = task.into_item();
        item.updated = Some(ts(100));

        let transport = MemoryTransport::with_items(vec![item]);
        sync_once(&pool, &transport).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let stored = item_repo::find_task(&mut conn, "r1").await.unwrap();
        assert_eq!(stored.recurrer, Recur::parse("2024-01-01, daily"));
    }
}
