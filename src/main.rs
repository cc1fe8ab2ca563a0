use clap::{Parser, Subcommand};
use std::path::PathBuf;

use dayplan::commands::{ConfigCommand, EventCommand, SyncCommand, TaskCommand};
use dayplan::config::Config;
use dayplan::db::init_db;

#[derive(Parser)]
#[command(name = "dayplan")]
#[command(version)]
#[command(about = "A recurring-task planner with offline-first sync", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage tasks
    Task(TaskCommand),

    /// Manage events
    Event(EventCommand),

    /// Sync with the remote server
    Sync(SyncCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Task(cmd)) => {
            let pool = init_db(config.database_path.clone()).await?;
            cmd.run(&pool).await?;
        }
        Some(Commands::Event(cmd)) => {
            let pool = init_db(config.database_path.clone()).await?;
            cmd.run(&pool).await?;
        }
        Some(Commands::Sync(cmd)) => {
            let pool = init_db(config.database_path.clone()).await?;
            cmd.run(&pool, &config).await?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(&config)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
