//! Client-side synchronization: the transport to the server and the
//! reconciler that keeps the local replica converged with it.

pub mod client;
pub mod reconcile;

pub use client::{HttpTransport, Transport, TransportError};
pub use reconcile::{sync_once, SyncError, SyncReport};
