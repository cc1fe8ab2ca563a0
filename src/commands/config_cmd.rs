use clap::{Args, Subcommand};

use crate::config::Config;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show,
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show => {
                println!("Configuration");
                println!("=============\n");

                println!("Config file: {}", Config::default_config_path().display());
                println!();

                println!("database_path: {}", config.database_path.display());
                println!(
                    "sync_url: {}",
                    config.sync_url.as_deref().unwrap_or("(not set)")
                );
                println!(
                    "sync_api_key: {}",
                    if config.sync_api_key.is_some() {
                        "(set)"
                    } else {
                        "(not set)"
                    }
                );

                Ok(())
            }
        }
    }
}
