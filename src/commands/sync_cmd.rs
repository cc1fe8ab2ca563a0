//! Sync CLI command: runs one reconciler pass against the configured
//! server.

use clap::{Args, Subcommand};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::sync::{sync_once, HttpTransport};

/// Sync with the remote server
#[derive(Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Subcommand)]
enum SyncSubcommand {
    /// Show sync configuration
    Status,
}

impl SyncCommand {
    pub async fn run(
        &self,
        pool: &SqlitePool,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            None => self.sync(pool, config).await,
            Some(SyncSubcommand::Status) => self.status(config),
        }
    }

    async fn sync(
        &self,
        pool: &SqlitePool,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let (url, key) = match (&config.sync_url, &config.sync_api_key) {
            (Some(url), Some(key)) => (url, key),
            _ => {
                return Err(
                    "Sync is not configured; run `dayplan sync status` for instructions".into(),
                );
            }
        };

        let transport = HttpTransport::new(url, key)?;
        let report = sync_once(pool, &transport).await?;

        println!("Sync complete.");
        println!("  pushed:   {}", report.pushed);
        println!("  received: {}", report.received);
        println!("  merged:   {}", report.merged);
        println!("  deleted:  {}", report.deleted);

        Ok(())
    }

    fn status(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        println!("Sync Configuration");
        println!("==================");
        println!();

        let (url, key) = match (&config.sync_url, &config.sync_api_key) {
            (Some(url), Some(key)) => (url, key),
            _ => {
                println!("Status: Not configured");
                println!();
                println!("To enable sync, add to your config file:");
                println!();
                println!("  sync_url: \"http://localhost:8092\"");
                println!("  sync_api_key: \"your-api-key\"");
                println!();
                println!("Or set environment variables:");
                println!("  DAYPLAN_SYNC_URL");
                println!("  DAYPLAN_SYNC_API_KEY");
                return Ok(());
            }
        };

        println!("Server:  {}", url);
        println!("API Key: {}...", &key[..key.len().min(8)]);

        Ok(())
    }
}
