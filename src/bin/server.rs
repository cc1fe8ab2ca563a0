//! Dayplan Sync Server
//!
//! The authoritative store for dayplan replicas. Stamps every pushed
//! item, serves incremental pulls and materializes recurring items in
//! the background.
//!
//! # Configuration
//!
//! Environment variables:
//! - `DAYPLAN_PORT`: Port to listen on (default: 8092)
//! - `DAYPLAN_SERVER_DB`: Path to the SQLite database
//!   (default: ~/.local/share/dayplan-server/server.db)
//! - `DAYPLAN_API_KEY`: Shared bearer key clients must present (required)
//! - `DAYPLAN_RECUR_DAYS`: Recurrence look-ahead horizon in days (default: 14)
//! - `DAYPLAN_RECUR_INTERVAL_SECS`: Seconds between recurrence passes
//!   (default: 3600)
//!
//! # Endpoints
//!
//! - `GET /health`: Health check (no auth required)
//! - `POST /sync`: Upsert a batch of items (auth required)
//! - `GET /sync?ks=task,event&ts=<rfc3339>`: Incremental pull (auth required)

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dayplan::server::{router, AppState, ItemStore, Scheduler};

/// Server configuration
#[derive(Debug, Clone)]
struct Config {
    port: u16,
    db_path: PathBuf,
    api_key: String,
    recur_days: u32,
    recur_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self, String> {
        let port = std::env::var("DAYPLAN_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8092);

        let db_path = std::env::var("DAYPLAN_SERVER_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("dayplan-server")
                    .join("server.db")
            });

        let api_key =
            std::env::var("DAYPLAN_API_KEY").map_err(|_| "DAYPLAN_API_KEY is not set")?;
        if api_key.is_empty() {
            return Err("DAYPLAN_API_KEY must not be empty".to_string());
        }

        let recur_days = std::env::var("DAYPLAN_RECUR_DAYS")
            .ok()
            .and_then(|d| d.parse().ok())
            .unwrap_or(14);

        let recur_interval = std::env::var("DAYPLAN_RECUR_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(3600));

        Ok(Self {
            port,
            db_path,
            api_key,
            recur_days,
            recur_interval,
        })
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dayplan=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Database: {}", config.db_path.display());

    let store = match ItemStore::open(config.db_path.clone()).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    // Recurrence scheduler in the background, stopped via the watch
    // channel on shutdown.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = Scheduler::new(store.clone(), config.recur_days);
    let scheduler_handle = tokio::spawn(scheduler.run(config.recur_interval, shutdown_rx));

    let app = router(AppState {
        store,
        api_key: config.api_key.clone(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {}", e);
    }

    let _ = shutdown_tx.send(true);
    let _ = scheduler_handle.await;
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received");
}
