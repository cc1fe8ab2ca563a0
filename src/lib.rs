//! dayplan: a recurring-task planner with offline-first sync.
//!
//! The crate ships two binaries. `dayplan` is the CLI working against a
//! local SQLite replica; `dayplan-server` is the authoritative sync
//! server that stamps updates, serves pulls and materializes recurring
//! items in the background.

pub mod commands;
pub mod config;
pub mod db;
pub mod models;
pub mod server;
pub mod sync;
