//! GitLab API client (target side)
//!
//! Covers the v4 REST calls the pipeline needs: project lookup, branch
//! listing/creation, and merge-request creation. Branch creation maps
//! the provider's "already exists" rejection onto
//! [`HostError::BranchAlreadyExists`] so callers can treat a lost
//! creation race as success.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::HostClient;
use crate::error::{HostError, Result};
use crate::types::{Branch, CreateBranch, CreateMergeRequest, MergeRequestInfo, ProjectInfo};

const PROVIDER: &str = "gitlab";
const DEFAULT_BASE_URL: &str = "https://gitlab.com";

/// HTTP client for the GitLab v4 API
#[derive(Debug, Clone)]
pub struct GitlabClient {
    base_url: String,
    token: String,
    client: Client,
}

impl GitlabClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    /// Points the client at a self-hosted instance or a test server.
    pub fn with_base_url(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
            client: Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api(&self, path: &str) -> String {
        format!("{}/api/v4{}", self.base_url, path)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(self.api(path))
            .header("PRIVATE-TOKEN", &self.token)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(self.api(path))
            .header("PRIVATE-TOKEN", &self.token)
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = extract_message(&body);
            return Err(HostError::from_status(PROVIDER, status.as_u16(), message));
        }
        response.json().await.map_err(|e| HostError::Parse {
            provider: PROVIDER,
            message: e.to_string(),
        })
    }
}

/// Percent-encodes a "group/project" path for use as a path segment.
/// Numeric project ids pass through unchanged.
fn encode_project(project: &str) -> String {
    project.replace('/', "%2F")
}

#[async_trait]
impl HostClient for GitlabClient {
    async fn get_project(&self, project: &str) -> Result<ProjectInfo> {
        debug!("fetching gitlab project {}", project);
        let response = self
            .get(&format!("/projects/{}", encode_project(project)))
            .send()
            .await?;
        let row: ProjectRow = self.handle_response(response).await?;
        Ok(ProjectInfo {
            id: Some(row.id),
            name: row.name,
            full_path: row.path_with_namespace,
            default_branch: row.default_branch,
            http_url: row.http_url_to_repo,
        })
    }

    async fn list_branches(&self, project: &str) -> Result<Vec<Branch>> {
        let response = self
            .get(&format!(
                "/projects/{}/repository/branches",
                encode_project(project)
            ))
            .query(&[("per_page", "100")])
            .send()
            .await?;
        let branches: Vec<BranchRow> = self.handle_response(response).await?;
        Ok(branches.into_iter().map(Into::into).collect())
    }

    async fn create_branch(&self, project: &str, req: CreateBranch) -> Result<Branch> {
        debug!(
            "creating gitlab branch {} from {} on {}",
            req.name, req.base_ref, project
        );
        let response = self
            .post(&format!(
                "/projects/{}/repository/branches",
                encode_project(project)
            ))
            .query(&[("branch", req.name.as_str()), ("ref", req.base_ref.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 400 {
            let body = response.text().await.unwrap_or_default();
            let message = extract_message(&body);
            if message.to_lowercase().contains("already exists") {
                return Err(HostError::BranchAlreadyExists(req.name));
            }
            return Err(HostError::from_status(PROVIDER, 400, message));
        }

        let row: BranchRow = self.handle_response(response).await?;
        Ok(row.into())
    }

    async fn create_merge_request(
        &self,
        project: &str,
        req: CreateMergeRequest,
    ) -> Result<MergeRequestInfo> {
        debug!(
            "opening gitlab merge request {} -> {} on {}",
            req.source_branch, req.target_branch, project
        );
        let response = self
            .post(&format!(
                "/projects/{}/merge_requests",
                encode_project(project)
            ))
            .json(&serde_json::json!({
                "source_branch": req.source_branch,
                "target_branch": req.target_branch,
                "title": req.title,
                "description": req.description,
            }))
            .send()
            .await?;
        let row: MergeRequestRow = self.handle_response(response).await?;
        Ok(MergeRequestInfo {
            id: row.id,
            iid: Some(row.iid),
            web_url: row.web_url,
        })
    }
}

/// Best-effort extraction of GitLab's `message`/`error` field from an
/// error body. GitLab sometimes nests messages in arrays or maps; those
/// are flattened to their string form.
fn extract_message(body: &str) -> String {
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return body.trim().to_string(),
    };
    let message = value.get("message").or_else(|| value.get("error"));
    match message {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => body.trim().to_string(),
    }
}

// =============================================================================
// Response Row Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ProjectRow {
    id: i64,
    name: String,
    path_with_namespace: String,
    default_branch: Option<String>,
    http_url_to_repo: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BranchRow {
    name: String,
    commit: Option<CommitRow>,
}

#[derive(Debug, Deserialize)]
struct CommitRow {
    id: String,
}

impl From<BranchRow> for Branch {
    fn from(row: BranchRow) -> Self {
        Branch {
            name: row.name,
            commit_sha: row.commit.map(|c| c.id),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MergeRequestRow {
    id: i64,
    iid: i64,
    web_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_path_encoding() {
        assert_eq!(encode_project("group/project"), "group%2Fproject");
        assert_eq!(encode_project("group/sub/project"), "group%2Fsub%2Fproject");
        assert_eq!(encode_project("12345"), "12345");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = GitlabClient::with_base_url("https://gitlab.example.com/", "token");
        assert_eq!(client.base_url(), "https://gitlab.example.com");
    }

    #[test]
    fn test_extract_message_shapes() {
        assert_eq!(
            extract_message(r#"{"message": "Branch already exists"}"#),
            "Branch already exists"
        );
        assert_eq!(
            extract_message(r#"{"error": "insufficient_scope"}"#),
            "insufficient_scope"
        );
        assert_eq!(
            extract_message(r#"{"message": {"base": ["invalid ref"]}}"#),
            r#"{"base":["invalid ref"]}"#
        );
        assert_eq!(extract_message("plain failure"), "plain failure");
    }

    #[test]
    fn test_branch_row_conversion() {
        let row: BranchRow =
            serde_json::from_str(r#"{"name": "main", "commit": {"id": "deadbeef"}}"#).unwrap();
        let branch: Branch = row.into();
        assert_eq!(branch.name, "main");
        assert_eq!(branch.commit_sha.as_deref(), Some("deadbeef"));
    }
}
