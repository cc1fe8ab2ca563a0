//! Background recurrence scheduler.
//!
//! On every tick the scheduler materializes all occurrences of recurring
//! items up to a look-ahead horizon. Each occurrence is spawned and the
//! item's cursor advanced in one transaction, so ticks are idempotent: a
//! second pass over the same horizon spawns nothing.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::server::storage::{ItemStore, StorageError};

pub struct Scheduler {
    store: ItemStore,
    look_ahead_days: u32,
}

impl Scheduler {
    pub fn new(store: ItemStore, look_ahead_days: u32) -> Self {
        Self {
            store,
            look_ahead_days,
        }
    }

    /// Runs one pass, returning the number of occurrences spawned.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<usize, StorageError> {
        let horizon = now.date_naive() + chrono::Duration::days(self.look_ahead_days as i64);

        let due = self.store.should_recur(horizon).await?;
        let mut spawned = 0;

        for mut item in due {
            let Some(rule) = item.recurrer.clone() else {
                continue;
            };
            let mut cursor = match item.recur_next {
                Some(date) => date,
                None => rule.first(),
            };

            while cursor <= horizon {
                let next = rule.first_after(cursor);
                let instance = self
                    .store
                    .spawn_occurrence(&item, cursor, next, now)
                    .await?;

                tracing::info!(
                    original = %item.id,
                    instance = %instance.id,
                    date = %cursor,
                    "spawned recurring occurrence"
                );

                item.recur_next = Some(next);
                cursor = next;
                spawned += 1;
            }
        }

        Ok(spawned)
    }

    /// Ticks on a fixed interval until `shutdown` flips to true. The
    /// first tick fires immediately so a restart catches up right away.
    pub async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut timer = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    match self.tick(Utc::now()).await {
                        Ok(0) => {}
                        Ok(count) => tracing::info!(count, "recurrence pass complete"),
                        Err(e) => tracing::error!("recurrence pass failed: {}", e),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("scheduler shutting down");
                        return;
                    }
                }
            }
        }
    }
}
