//! Normalized types shared by both hosting providers

use serde::{Deserialize, Serialize};

/// Project metadata, normalized across providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectInfo {
    /// Numeric id where the provider has one (GitLab)
    pub id: Option<i64>,
    pub name: String,
    /// "owner/name" or "group/project" path
    pub full_path: String,
    pub default_branch: Option<String>,
    /// HTTP clone URL, credential-free
    pub http_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub commit_sha: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBranch {
    pub name: String,
    /// Branch or ref the new branch starts from
    pub base_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMergeRequest {
    pub source_branch: String,
    pub target_branch: String,
    pub title: String,
    pub description: String,
}

/// Created merge/pull request, normalized across providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequestInfo {
    pub id: i64,
    /// Project-scoped number: GitLab iid / GitHub PR number
    pub iid: Option<i64>,
    pub web_url: String,
}
