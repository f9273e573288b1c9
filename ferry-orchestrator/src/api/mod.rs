//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod health;
pub mod progress;
pub mod run;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Pipeline endpoints
        .route("/api/pipeline/submit", post(run::submit_pipeline))
        // Run endpoints
        .route("/api/run/list", get(run::list_runs))
        .route("/api/run/{id}", get(run::get_run))
        .route("/api/stats", get(run::get_stats))
        // Progress endpoints
        .route("/api/progress/{operation_id}", get(progress::subscribe))
        .route(
            "/api/progress/{operation_id}/cancel",
            post(progress::cancel),
        )
        // Admin endpoints
        .route("/api/admin/cleanup", post(run::cleanup))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
