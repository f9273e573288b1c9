//! GitHub API client (source side)
//!
//! Covers the REST v3 calls the pipeline needs: repository lookup,
//! branch listing/creation, and pull-request creation.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{HostError, Result};
use crate::types::{Branch, CreateBranch, CreateMergeRequest, MergeRequestInfo, ProjectInfo};
use crate::HostClient;

const PROVIDER: &str = "github";
const DEFAULT_BASE_URL: &str = "https://api.github.com";

/// HTTP client for the GitHub REST API
#[derive(Debug, Clone)]
pub struct GithubClient {
    base_url: String,
    token: String,
    client: Client,
}

impl GithubClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    /// Points the client at a GitHub Enterprise instance or a test server.
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

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.request(self.client.get(format!("{}{}", self.base_url, path)))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.request(self.client.post(format!("{}{}", self.base_url, path)))
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(&self.token)
            .header("User-Agent", "ferry")
            .header("Accept", "application/vnd.github+json")
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

    /// Resolves the commit sha a base branch currently points at.
    async fn resolve_ref_sha(&self, project: &str, base: &str) -> Result<String> {
        let response = self
            .get(&format!("/repos/{}/git/ref/heads/{}", project, base))
            .send()
            .await?;
        let git_ref: GitRef = self.handle_response(response).await?;
        Ok(git_ref.object.sha)
    }
}

#[async_trait]
impl HostClient for GithubClient {
    async fn get_project(&self, project: &str) -> Result<ProjectInfo> {
        debug!("fetching github repository {}", project);
        let response = self.get(&format!("/repos/{}", project)).send().await?;
        let repo: Repository = self.handle_response(response).await?;
        Ok(ProjectInfo {
            id: Some(repo.id),
            name: repo.name,
            full_path: repo.full_name,
            default_branch: repo.default_branch,
            http_url: repo.clone_url,
        })
    }

    async fn list_branches(&self, project: &str) -> Result<Vec<Branch>> {
        let response = self
            .get(&format!("/repos/{}/branches", project))
            .query(&[("per_page", "100")])
            .send()
            .await?;
        let branches: Vec<BranchRow> = self.handle_response(response).await?;
        Ok(branches.into_iter().map(Into::into).collect())
    }

    async fn create_branch(&self, project: &str, req: CreateBranch) -> Result<Branch> {
        debug!(
            "creating github branch {} from {} on {}",
            req.name, req.base_ref, project
        );
        let sha = self.resolve_ref_sha(project, &req.base_ref).await?;

        let response = self
            .post(&format!("/repos/{}/git/refs", project))
            .json(&serde_json::json!({
                "ref": format!("refs/heads/{}", req.name),
                "sha": sha,
            }))
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 422 {
            let body = response.text().await.unwrap_or_default();
            let message = extract_message(&body);
            if message.to_lowercase().contains("already exists") {
                return Err(HostError::BranchAlreadyExists(req.name));
            }
            return Err(HostError::from_status(PROVIDER, 422, message));
        }

        let created: GitRef = self.handle_response(response).await?;
        Ok(Branch {
            name: req.name,
            commit_sha: Some(created.object.sha),
        })
    }

    async fn create_merge_request(
        &self,
        project: &str,
        req: CreateMergeRequest,
    ) -> Result<MergeRequestInfo> {
        debug!(
            "opening github pull request {} -> {} on {}",
            req.source_branch, req.target_branch, project
        );
        let response = self
            .post(&format!("/repos/{}/pulls", project))
            .json(&serde_json::json!({
                "title": req.title,
                "body": req.description,
                "head": req.source_branch,
                "base": req.target_branch,
            }))
            .send()
            .await?;
        let pr: PullRequest = self.handle_response(response).await?;
        Ok(MergeRequestInfo {
            id: pr.id,
            iid: Some(pr.number),
            web_url: pr.html_url,
        })
    }
}

/// Best-effort extraction of GitHub's `message` field from an error body.
fn extract_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| body.trim().to_string())
}

// =============================================================================
// Response Row Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct Repository {
    id: i64,
    name: String,
    full_name: String,
    default_branch: Option<String>,
    clone_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BranchRow {
    name: String,
    commit: Option<CommitRow>,
}

#[derive(Debug, Deserialize)]
struct CommitRow {
    sha: String,
}

impl From<BranchRow> for Branch {
    fn from(row: BranchRow) -> Self {
        Branch {
            name: row.name,
            commit_sha: row.commit.map(|c| c.sha),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitRef {
    object: RefObject,
}

#[derive(Debug, Deserialize)]
struct RefObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    id: i64,
    number: i64,
    html_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = GithubClient::with_base_url("https://ghe.example.com/", "token");
        assert_eq!(client.base_url(), "https://ghe.example.com");
    }

    #[test]
    fn test_extract_message_from_error_body() {
        assert_eq!(
            extract_message(r#"{"message": "Bad credentials"}"#),
            "Bad credentials"
        );
        assert_eq!(extract_message("plain text error "), "plain text error");
        assert_eq!(extract_message(r#"{"other": 1}"#), r#"{"other": 1}"#);
    }

    #[test]
    fn test_branch_row_conversion() {
        let row: BranchRow =
            serde_json::from_str(r#"{"name": "main", "commit": {"sha": "abc"}}"#).unwrap();
        let branch: Branch = row.into();
        assert_eq!(branch.name, "main");
        assert_eq!(branch.commit_sha.as_deref(), Some("abc"));
    }
}
