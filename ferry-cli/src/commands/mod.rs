//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod admin;
mod run;

pub use admin::AdminCommands;
pub use run::RunCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run management
    Run {
        #[command(subcommand)]
        command: RunCommands,
    },
    /// Administrative operations
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Run { command } => run::handle_run_command(command, config).await,
        Commands::Admin { command } => admin::handle_admin_command(command, config).await,
    }
}
