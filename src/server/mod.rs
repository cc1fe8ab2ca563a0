//! Server-side half of dayplan: the authoritative item store, the HTTP
//! sync API, and the background recurrence scheduler.

pub mod api;
pub mod scheduler;
pub mod storage;

pub use api::{router, AppState};
pub use scheduler::Scheduler;
pub use storage::{ItemStore, StorageError};
