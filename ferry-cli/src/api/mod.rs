//! API client module
//!
//! HTTP client for communicating with the Ferry orchestrator API.

use anyhow::{Context, Result};
use ferry_core::domain::run::{PipelineRun, PipelineStats};
use ferry_core::dto::{
    CancelResponse, CleanupRequest, CleanupResponse, RunListPage, SubmitAccepted, SubmitPipeline,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// HTTP client for the Ferry orchestrator API
pub struct ApiClient {
    base_url: String,
    client: Client,
}

impl ApiClient {
    /// Create a new API client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the orchestrator API
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    /// Submit a new pipeline run
    ///
    /// # Arguments
    /// * `req` - The submission request
    ///
    /// # Returns
    /// The accepted acknowledgement with run and operation ids
    pub async fn submit_pipeline(&self, req: SubmitPipeline) -> Result<SubmitAccepted> {
        let url = format!("{}/api/pipeline/submit", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&req)
            .send()
            .await
            .context("Failed to send submit request")?;

        self.handle_response(response).await
    }

    /// Get a run by ID
    ///
    /// # Arguments
    /// * `id` - The run UUID
    /// * `owner_id` - Owner the run must belong to
    pub async fn get_run(&self, id: Uuid, owner_id: &str) -> Result<PipelineRun> {
        let url = format!("{}/api/run/{}", self.base_url, id);
        let response = self
            .client
            .get(&url)
            .query(&[("owner_id", owner_id)])
            .send()
            .await
            .context("Failed to send get run request")?;

        self.handle_response(response).await
    }

    /// List an owner's runs, newest first
    pub async fn list_runs(
        &self,
        owner_id: &str,
        page: i64,
        page_size: i64,
    ) -> Result<RunListPage> {
        let url = format!("{}/api/run/list", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("owner_id", owner_id.to_string()),
                ("page", page.to_string()),
                ("page_size", page_size.to_string()),
            ])
            .send()
            .await
            .context("Failed to send list runs request")?;

        self.handle_response(response).await
    }

    /// Get aggregate statistics; omit the owner for the global view
    pub async fn get_stats(&self, owner_id: Option<&str>) -> Result<PipelineStats> {
        let url = format!("{}/api/stats", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(owner) = owner_id {
            request = request.query(&[("owner_id", owner)]);
        }
        let response = request
            .send()
            .await
            .context("Failed to send stats request")?;

        self.handle_response(response).await
    }

    /// Request cancellation of an in-flight fetch operation
    pub async fn cancel_fetch(&self, operation_id: &str) -> Result<CancelResponse> {
        let url = format!(
            "{}/api/progress/{}/cancel",
            self.base_url, operation_id
        );
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .context("Failed to send cancel request")?;

        self.handle_response(response).await
    }

    /// Trigger the retention sweep
    pub async fn cleanup(&self, days_old: i64) -> Result<CleanupResponse> {
        let url = format!("{}/api/admin/cleanup", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&CleanupRequest { days_old })
            .send()
            .await
            .context("Failed to send cleanup request")?;

        self.handle_response(response).await
    }

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Request failed with status {}: {}", status, error_text);
        }

        response
            .json()
            .await
            .context("Failed to parse JSON response")
    }
}
