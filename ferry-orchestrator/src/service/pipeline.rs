//! Pipeline driver
//!
//! Executes the fixed five-step sequence for one run as a detached
//! background task. The driver performs the idle -> in_progress ->
//! terminal bookkeeping uniformly for every step: the in_progress write
//! lands before the step's work starts and the terminal write after it
//! finishes, so a concurrent poller always observes steps advancing in
//! stage order. The first failing step ends the run; later steps are
//! never attempted and already-applied external side effects are left in
//! place for out-of-band cleanup.

use chrono::Utc;
use ferry_core::domain::config::PipelineConfig;
use ferry_core::domain::run::{ErrorDetail, RunStatus, StepName, StepRecord, StepStatus};
use sqlx::PgPool;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::repository::run_repository;
use crate::service::progress::ProgressRegistry;
use crate::service::steps::{self, StepContext};

/// Drives one run to a terminal status. Never panics and never leaves
/// the run in_progress on any path it controls; a database outage while
/// persisting is logged and abandons the run (external liveness
/// monitoring is the documented guard for that gap).
pub async fn execute(
    pool: PgPool,
    registry: ProgressRegistry,
    run_id: Uuid,
    config: PipelineConfig,
    operation_id: String,
) {
    info!("starting pipeline run {}", run_id);

    let mut records: Vec<StepRecord> = StepName::ALL.iter().map(|n| StepRecord::idle(*n)).collect();
    let mut ctx = StepContext::new(config, operation_id, registry.clone());

    for (index, name) in StepName::ALL.iter().enumerate() {
        if let Err(err) = mark_step(
            &pool,
            run_id,
            &mut records,
            index,
            StepStatus::InProgress,
            None,
            None,
        )
        .await
        {
            error!(
                "run {}: could not persist start of step {}, abandoning: {}",
                run_id, name, err
            );
            registry.remove(&ctx.operation_id);
            return;
        }
        info!("run {}: step {} started", run_id, name);

        match steps::run_step(*name, &mut ctx).await {
            Ok(outcome) => {
                info!("run {}: step {} succeeded: {}", run_id, name, outcome.message);
                if let Err(err) = mark_step(
                    &pool,
                    run_id,
                    &mut records,
                    index,
                    StepStatus::Success,
                    Some(outcome.message),
                    None,
                )
                .await
                {
                    error!(
                        "run {}: could not persist success of step {}, abandoning: {}",
                        run_id, name, err
                    );
                    registry.remove(&ctx.operation_id);
                    return;
                }
            }
            Err(step_err) => {
                warn!(
                    "run {}: step {} failed ({}): {}",
                    run_id,
                    name,
                    step_err.kind(),
                    step_err
                );
                let message = step_err.to_string();
                if let Err(err) = mark_step(
                    &pool,
                    run_id,
                    &mut records,
                    index,
                    StepStatus::Failed,
                    None,
                    Some(message.clone()),
                )
                .await
                {
                    error!(
                        "run {}: could not persist failure of step {}: {}",
                        run_id, name, err
                    );
                }

                let detail = ErrorDetail {
                    step: *name,
                    message,
                };
                if let Err(err) =
                    run_repository::update_status(&pool, run_id, RunStatus::Failed, Some(&detail))
                        .await
                {
                    error!("run {}: could not persist failed status: {}", run_id, err);
                }
                registry.remove(&ctx.operation_id);
                info!("run {} failed at step {}", run_id, name);
                return;
            }
        }
    }

    if let Some(result) = ctx.result() {
        if let Err(err) = run_repository::update_result(&pool, run_id, &result).await {
            error!("run {}: could not persist result payload: {}", run_id, err);
        }
    }
    if let Err(err) = run_repository::update_status(&pool, run_id, RunStatus::Success, None).await {
        error!("run {}: could not persist success status: {}", run_id, err);
    }
    info!("run {} completed successfully", run_id);
}

/// Applies one step transition in memory through the domain rules, then
/// persists the whole step array. The in-memory copy is authoritative:
/// the driver is the run's only writer.
async fn mark_step(
    pool: &PgPool,
    run_id: Uuid,
    records: &mut [StepRecord],
    index: usize,
    status: StepStatus,
    message: Option<String>,
    error_message: Option<String>,
) -> Result<(), String> {
    records[index]
        .transition(status, message, error_message, Utc::now())
        .map_err(|e| e.to_string())?;
    run_repository::update_steps(pool, run_id, records)
        .await
        .map_err(|e| e.to_string())
}
