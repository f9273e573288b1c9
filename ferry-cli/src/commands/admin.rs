//! Admin command handlers
//!
//! Statistics, the retention sweep, and fetch cancellation.

use anyhow::Result;
use clap::Subcommand;
use colored::*;

use crate::api::ApiClient;
use crate::config::Config;

/// Admin subcommands
#[derive(Subcommand)]
pub enum AdminCommands {
    /// Show aggregate run statistics
    Stats {
        /// Restrict to one owner; omit for the global view
        #[arg(short, long)]
        owner: Option<String>,
    },
    /// Delete terminal runs older than the cutoff
    Cleanup {
        /// Age cutoff in days
        #[arg(short, long)]
        days: i64,
    },
    /// Cancel an in-flight fetch operation
    Cancel {
        /// Operation ID returned at submission
        operation_id: String,
    },
}

/// Handle admin commands
pub async fn handle_admin_command(command: AdminCommands, config: &Config) -> Result<()> {
    let client = ApiClient::new(&config.orchestrator_url);

    match command {
        AdminCommands::Stats { owner } => show_stats(&client, owner.as_deref()).await,
        AdminCommands::Cleanup { days } => cleanup(&client, days).await,
        AdminCommands::Cancel { operation_id } => cancel(&client, &operation_id).await,
    }
}

/// Display aggregate statistics
async fn show_stats(client: &ApiClient, owner: Option<&str>) -> Result<()> {
    let stats = client.get_stats(owner).await?;

    match owner {
        Some(owner) => println!("{}", format!("Stats for {}:", owner).bold()),
        None => println!("{}", "Global stats:".bold()),
    }
    println!("  Succeeded:   {}", stats.success_count.to_string().green());
    println!("  Failed:      {}", stats.failed_count.to_string().red());
    println!("  In progress: {}", stats.in_progress_count);
    match stats.average_duration_ms {
        Some(avg) => println!("  Avg duration: {:.0}ms", avg),
        None => println!("  Avg duration: n/a"),
    }

    Ok(())
}

/// Trigger the retention sweep
async fn cleanup(client: &ApiClient, days: i64) -> Result<()> {
    let response = client.cleanup(days).await?;
    println!(
        "{}",
        format!("Deleted {} run(s) older than {} days.", response.deleted_count, days).bold()
    );
    Ok(())
}

/// Cancel an in-flight fetch
async fn cancel(client: &ApiClient, operation_id: &str) -> Result<()> {
    let response = client.cancel_fetch(operation_id).await?;
    if response.cancelled {
        println!("{}", format!("Operation {} cancelled.", operation_id).green());
    } else {
        println!(
            "{}",
            format!("No active operation {} to cancel.", operation_id).yellow()
        );
    }
    Ok(())
}
