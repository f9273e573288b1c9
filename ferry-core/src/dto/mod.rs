//! DTOs for the orchestrator API

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::config::PipelineConfig;
use crate::domain::run::PipelineRun;

/// Request to submit a new pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitPipeline {
    pub owner_id: String,
    pub configuration: PipelineConfig,
}

/// Accepted acknowledgement returned immediately on submission.
/// The pipeline itself runs in the background; poll with the run id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAccepted {
    pub run_id: Uuid,
    /// Key for subscribing to fetch-step progress
    pub operation_id: String,
}

/// One page of an owner's runs, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunListPage {
    pub runs: Vec<PipelineRun>,
    pub total: i64,
    pub total_pages: i64,
    pub page: i64,
    pub page_size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupRequest {
    pub days_old: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupResponse {
    pub deleted_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}
