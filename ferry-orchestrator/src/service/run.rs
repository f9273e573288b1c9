//! Run Service
//!
//! Business logic for submission, the read path, statistics, and the
//! retention sweep. Submission validates before any side effect, creates
//! the run record, and spawns the detached pipeline task; the caller
//! never blocks on pipeline completion.

use ferry_core::domain::run::{PipelineRun, PipelineStats};
use ferry_core::dto::{RunListPage, SubmitAccepted, SubmitPipeline};
use sqlx::PgPool;
use uuid::Uuid;

use crate::repository::run_repository;
use crate::service::pipeline_service;
use crate::service::progress::ProgressRegistry;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Service error type
#[derive(Debug)]
pub enum RunError {
    NotFound(Uuid),
    Forbidden(Uuid),
    ValidationError(String),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for RunError {
    fn from(err: sqlx::Error) -> Self {
        RunError::DatabaseError(err)
    }
}

/// Validates the configuration, persists the run (status in_progress,
/// all steps idle), registers the fetch progress channel, and spawns the
/// background pipeline task. Returns the run id immediately.
pub async fn submit(
    pool: &PgPool,
    registry: &ProgressRegistry,
    req: SubmitPipeline,
) -> Result<SubmitAccepted, RunError> {
    if req.owner_id.trim().is_empty() {
        return Err(RunError::ValidationError(
            "owner_id is required".to_string(),
        ));
    }
    req.configuration
        .validate()
        .map_err(|e| RunError::ValidationError(e.to_string()))?;

    // The persisted snapshot never contains credentials; the live config
    // stays in memory with the background task only.
    let run = PipelineRun::new(req.owner_id, req.configuration.redacted());
    let operation_id = req
        .configuration
        .operation_id
        .clone()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| run.id.to_string());

    run_repository::create(pool, &run).await?;
    tracing::info!("Run created: {} for owner {}", run.id, run.owner_id);

    // Channel exists before the task starts so subscribers can attach as
    // soon as they hold the accepted response.
    registry.register(&operation_id);

    let pool = pool.clone();
    let registry = registry.clone();
    let run_id = run.id;
    let config = req.configuration;
    let op = operation_id.clone();
    tokio::spawn(async move {
        pipeline_service::execute(pool, registry, run_id, config, op).await;
    });

    Ok(SubmitAccepted {
        run_id,
        operation_id,
    })
}

/// Get a run, enforcing that only its owner may read it
pub async fn get_run(pool: &PgPool, id: Uuid, owner_id: &str) -> Result<PipelineRun, RunError> {
    let run = run_repository::find_by_id(pool, id)
        .await?
        .ok_or(RunError::NotFound(id))?;

    if run.owner_id != owner_id {
        return Err(RunError::Forbidden(id));
    }

    Ok(run)
}

/// List an owner's runs, newest first
pub async fn list_runs(
    pool: &PgPool,
    owner_id: &str,
    page: i64,
    page_size: i64,
) -> Result<RunListPage, RunError> {
    let page = page.max(1);
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);

    let (runs, total) = run_repository::list_by_owner(pool, owner_id, page, page_size).await?;

    Ok(RunListPage {
        runs,
        total,
        total_pages: total_pages(total, page_size),
        page,
        page_size,
    })
}

/// Aggregate statistics, owner-scoped or global
pub async fn stats(pool: &PgPool, owner_id: Option<&str>) -> Result<PipelineStats, RunError> {
    let stats = run_repository::aggregate_stats(pool, owner_id).await?;
    Ok(stats)
}

/// Retention sweep over terminal runs older than the cutoff
pub async fn cleanup(pool: &PgPool, days_old: i64) -> Result<u64, RunError> {
    if days_old < 0 {
        return Err(RunError::ValidationError(
            "days_old must be non-negative".to_string(),
        ));
    }

    let deleted = run_repository::delete_older_than(pool, days_old).await?;
    tracing::info!("Retention sweep removed {} run(s)", deleted);
    Ok(deleted)
}

/// Request cancellation of an in-flight fetch by operation id
pub fn cancel_fetch(registry: &ProgressRegistry, operation_id: &str) -> bool {
    registry.cancel(operation_id)
}

fn total_pages(total: i64, page_size: i64) -> i64 {
    if total == 0 {
        0
    } else {
        (total + page_size - 1) / page_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages_rounding() {
        assert_eq!(total_pages(0, 20), 0);
        assert_eq!(total_pages(1, 20), 1);
        assert_eq!(total_pages(20, 20), 1);
        assert_eq!(total_pages(21, 20), 2);
        assert_eq!(total_pages(100, 20), 5);
    }
}
