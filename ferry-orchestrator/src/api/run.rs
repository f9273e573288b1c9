//! Run API Handlers
//!
//! HTTP endpoints for submitting pipelines and reading run state.
//! Submission returns 202 with the run id immediately; the pipeline
//! executes in the background and is observed by polling these
//! endpoints (or the progress stream for the fetch step).

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use ferry_core::domain::run::{PipelineRun, PipelineStats};
use ferry_core::dto::{
    CleanupRequest, CleanupResponse, RunListPage, SubmitAccepted, SubmitPipeline,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::service::run_service;
use crate::state::AppState;

/// POST /api/pipeline/submit
/// Validate and accept a new pipeline run
pub async fn submit_pipeline(
    State(state): State<AppState>,
    Json(req): Json<SubmitPipeline>,
) -> ApiResult<(StatusCode, Json<SubmitAccepted>)> {
    tracing::info!(
        "Submitting pipeline for owner {}: {} -> {}",
        req.owner_id,
        req.configuration.github_repo,
        req.configuration.gitlab_project
    );

    let accepted = run_service::submit(&state.pool, &state.progress, req).await?;

    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// GET /api/run/{id}?owner_id=...
/// Get run details by ID; readable only by its owner
pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<OwnerQuery>,
) -> ApiResult<Json<PipelineRun>> {
    tracing::debug!("Getting run: {}", id);

    let run = run_service::get_run(&state.pool, id, &params.owner_id).await?;

    Ok(Json(run))
}

/// GET /api/run/list?owner_id=...&page=...&page_size=...
/// List an owner's runs, newest first
pub async fn list_runs(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> ApiResult<Json<RunListPage>> {
    tracing::debug!("Listing runs for owner: {}", params.owner_id);

    let page = params.page.unwrap_or(1);
    let page_size = params
        .page_size
        .unwrap_or(run_service::DEFAULT_PAGE_SIZE);
    let list = run_service::list_runs(&state.pool, &params.owner_id, page, page_size).await?;

    Ok(Json(list))
}

/// GET /api/stats?owner_id=...
/// Aggregate statistics; omitting owner_id returns the global view
pub async fn get_stats(
    State(state): State<AppState>,
    Query(params): Query<StatsQuery>,
) -> ApiResult<Json<PipelineStats>> {
    tracing::debug!("Computing stats (owner: {:?})", params.owner_id);

    let stats = run_service::stats(&state.pool, params.owner_id.as_deref()).await?;

    Ok(Json(stats))
}

/// POST /api/admin/cleanup
/// Retention sweep; never touches in-progress runs
pub async fn cleanup(
    State(state): State<AppState>,
    Json(req): Json<CleanupRequest>,
) -> ApiResult<Json<CleanupResponse>> {
    tracing::info!("Cleanup requested for runs older than {} days", req.days_old);

    let deleted_count = run_service::cleanup(&state.pool, req.days_old).await?;

    Ok(Json(CleanupResponse { deleted_count }))
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub owner_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub owner_id: String,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub owner_id: Option<String>,
}
