mod config_cmd;
mod event;
mod sync_cmd;
mod task;

pub use config_cmd::ConfigCommand;
pub use event::EventCommand;
pub use sync_cmd::SyncCommand;
pub use task::TaskCommand;
