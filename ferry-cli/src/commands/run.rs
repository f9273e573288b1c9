//! Run command handlers
//!
//! Handles submitting pipeline runs, polling their status, and listing
//! an owner's run history.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use ferry_core::domain::config::PipelineConfig;
use ferry_core::domain::run::{PipelineRun, RunStatus, StepStatus};
use ferry_core::dto::SubmitPipeline;
use uuid::Uuid;

use crate::api::ApiClient;
use crate::config::Config;

/// Run subcommands
#[derive(Subcommand)]
pub enum RunCommands {
    /// Submit a pipeline run from a JSON configuration file
    Submit {
        /// Path to the pipeline configuration JSON
        #[arg(short, long)]
        config: String,

        /// Owner the run is submitted as
        #[arg(short, long)]
        owner: String,

        /// Poll until the run reaches a terminal status
        #[arg(short, long)]
        watch: bool,
    },
    /// Get run details
    Get {
        /// Run ID
        id: Uuid,

        /// Owner the run belongs to
        #[arg(short, long)]
        owner: String,

        /// Poll until the run reaches a terminal status
        #[arg(short, long)]
        watch: bool,
    },
    /// List runs for an owner
    List {
        /// Owner to list runs for
        #[arg(short, long)]
        owner: String,

        /// Page number (1-based)
        #[arg(long, default_value = "1")]
        page: i64,

        /// Page size
        #[arg(long, default_value = "20")]
        page_size: i64,
    },
}

/// Handle run commands
pub async fn handle_run_command(command: RunCommands, config: &Config) -> Result<()> {
    let client = ApiClient::new(&config.orchestrator_url);

    match command {
        RunCommands::Submit {
            config: path,
            owner,
            watch,
        } => submit_run(&client, &path, owner, watch).await,
        RunCommands::Get { id, owner, watch } => get_run(&client, id, &owner, watch).await,
        RunCommands::List {
            owner,
            page,
            page_size,
        } => list_runs(&client, &owner, page, page_size).await,
    }
}

/// Submit a run from a configuration file
async fn submit_run(client: &ApiClient, path: &str, owner: String, watch: bool) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file {}", path))?;
    let configuration: PipelineConfig =
        serde_json::from_str(&raw).context("Invalid pipeline configuration")?;

    let accepted = client
        .submit_pipeline(SubmitPipeline {
            owner_id: owner.clone(),
            configuration,
        })
        .await?;

    println!("{}", "Pipeline accepted.".green().bold());
    println!("  Run ID:       {}", accepted.run_id);
    println!("  Operation ID: {}", accepted.operation_id);

    if watch {
        watch_run(client, accepted.run_id, &owner).await?;
    }

    Ok(())
}

/// Get and display a single run
async fn get_run(client: &ApiClient, id: Uuid, owner: &str, watch: bool) -> Result<()> {
    if watch {
        watch_run(client, id, owner).await
    } else {
        let run = client.get_run(id, owner).await?;
        print_run_details(&run);
        Ok(())
    }
}

/// Poll a run until it reaches a terminal status
async fn watch_run(client: &ApiClient, id: Uuid, owner: &str) -> Result<()> {
    loop {
        let run = client.get_run(id, owner).await?;
        print_run_details(&run);

        if run.status.is_terminal() {
            return Ok(());
        }

        println!("{}", "...still running, polling again in 3s".dimmed());
        println!();
        tokio::time::sleep(Duration::from_secs(3)).await;
    }
}

/// List an owner's runs
async fn list_runs(client: &ApiClient, owner: &str, page: i64, page_size: i64) -> Result<()> {
    let list = client.list_runs(owner, page, page_size).await?;

    if list.runs.is_empty() {
        println!("{}", "No runs found.".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "Found {} run(s), page {}/{}:",
            list.total, list.page, list.total_pages
        )
        .bold()
    );
    println!();
    for run in &list.runs {
        println!(
            "  {} {} {} -> {} ({})",
            run.id,
            status_badge(run.status),
            run.configuration.github_repo,
            run.configuration.gitlab_project,
            run.start_time.format("%Y-%m-%d %H:%M:%S"),
        );
    }

    Ok(())
}

/// Print a run with its per-step breakdown
fn print_run_details(run: &PipelineRun) {
    println!("{} {}", "Run".bold(), run.id);
    println!("  Owner:  {}", run.owner_id);
    println!("  Status: {}", status_badge(run.status));
    if let Some(duration) = run.duration_ms {
        println!("  Took:   {}ms", duration);
    }
    println!("  Steps:");
    for step in &run.steps {
        let badge = match step.status {
            StepStatus::Idle => "idle".dimmed(),
            StepStatus::InProgress => "in progress".blue(),
            StepStatus::Success => "success".green(),
            StepStatus::Failed => "failed".red(),
        };
        let note = step
            .message
            .as_deref()
            .or(step.error_message.as_deref())
            .unwrap_or("");
        println!("    {:22} {:12} {}", step.name.as_str(), badge, note);
    }
    if let Some(result) = &run.result {
        println!(
            "  Result: {} files, {} folders, MR {}",
            result.files_copied, result.folders_copied, result.merge_request_url
        );
    }
    if let Some(error) = &run.error_detail {
        println!(
            "  Error:  step {} failed: {}",
            error.step.as_str().red(),
            error.message
        );
    }
}

fn status_badge(status: RunStatus) -> ColoredString {
    match status {
        RunStatus::InProgress => "in progress".blue(),
        RunStatus::Success => "success".green(),
        RunStatus::Failed => "failed".red(),
    }
}
