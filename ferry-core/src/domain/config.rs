//! Pipeline configuration types
//!
//! The submitted configuration is snapshotted onto the run at creation so
//! later reads are independent of any mutable settings store.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

pub const DEFAULT_GITLAB_BASE_URL: &str = "https://gitlab.com";

/// All inputs for one pipeline run.
///
/// Tokens are required at submission but blanked by [`PipelineConfig::redacted`]
/// before the snapshot is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Source repository as "owner/name"
    pub github_repo: String,
    pub github_token: String,
    /// Source branch; defaults to the repository's default branch
    #[serde(default)]
    pub github_branch: Option<String>,

    /// Target project as a numeric id or "group/project" path
    pub gitlab_project: String,
    pub gitlab_token: String,
    /// Defaults to gitlab.com for hosted projects
    #[serde(default)]
    pub gitlab_base_url: Option<String>,
    /// Base the new branch is created from; required
    pub target_base_branch: String,
    pub new_branch_name: String,

    #[serde(default)]
    pub copy_mode: CopyMode,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub folders: Vec<String>,
    /// Path inside the source repository to copy from
    #[serde(default)]
    pub source_subpath: Option<String>,
    /// Path inside the target repository to copy into
    #[serde(default)]
    pub dest_subpath: Option<String>,
    #[serde(default = "default_true")]
    pub preserve_folder_structure: bool,

    /// Local working-directory root for this run. Concurrent runs must use
    /// distinct paths; the orchestrator does not arbitrate collisions.
    pub work_dir: String,

    pub mr_title: String,
    #[serde(default)]
    pub mr_description: String,
    /// Defaults to `mr_title`
    #[serde(default)]
    pub commit_message: Option<String>,
    /// Progress-channel key for the fetch step; defaults to the run id
    #[serde(default)]
    pub operation_id: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Selects which configured patterns the copy step applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CopyMode {
    #[default]
    Files,
    Folders,
    Mixed,
}

impl PipelineConfig {
    /// Validates the configuration before any side effect is performed.
    /// Submission is rejected outright on failure; no run is created.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.github_token.trim().is_empty() {
            return Err(PipelineError::Validation(
                "github_token is required".to_string(),
            ));
        }
        if self.gitlab_token.trim().is_empty() {
            return Err(PipelineError::Validation(
                "gitlab_token is required".to_string(),
            ));
        }
        let (owner, name) = match self.github_repo.split_once('/') {
            Some(parts) => parts,
            None => {
                return Err(PipelineError::Validation(format!(
                    "github_repo must be in owner/name form, got '{}'",
                    self.github_repo
                )));
            }
        };
        if owner.is_empty() || name.is_empty() {
            return Err(PipelineError::Validation(format!(
                "github_repo must be in owner/name form, got '{}'",
                self.github_repo
            )));
        }
        if self.gitlab_project.trim().is_empty() {
            return Err(PipelineError::Validation(
                "gitlab_project is required".to_string(),
            ));
        }
        if self.target_base_branch.trim().is_empty() {
            return Err(PipelineError::Validation(
                "target_base_branch is required".to_string(),
            ));
        }
        if self.new_branch_name.trim().is_empty() {
            return Err(PipelineError::Validation(
                "new_branch_name is required".to_string(),
            ));
        }
        if self.work_dir.trim().is_empty() {
            return Err(PipelineError::Validation(
                "work_dir is required".to_string(),
            ));
        }
        if self.mr_title.trim().is_empty() {
            return Err(PipelineError::Validation(
                "mr_title is required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn gitlab_base_url(&self) -> &str {
        self.gitlab_base_url
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_GITLAB_BASE_URL)
    }

    pub fn effective_commit_message(&self) -> &str {
        self.commit_message
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.mr_title)
    }

    /// Copy of the configuration safe to persist and return to pollers.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.github_token = "***".to_string();
        copy.gitlab_token = "***".to_string();
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> PipelineConfig {
        serde_json::from_value(serde_json::json!({
            "github_repo": "octocat/hello",
            "github_token": "gh-token",
            "gitlab_project": "group/project",
            "gitlab_token": "gl-token",
            "target_base_branch": "main",
            "new_branch_name": "feature/import",
            "work_dir": "/tmp/ferry-test",
            "mr_title": "Import hello"
        }))
        .unwrap()
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let mut config = valid_config();
        config.github_token = String::new();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.gitlab_token = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_repo_rejected() {
        for repo in ["hello", "/hello", "octocat/", ""] {
            let mut config = valid_config();
            config.github_repo = repo.to_string();
            assert!(config.validate().is_err(), "repo '{}' should fail", repo);
        }
    }

    #[test]
    fn test_defaults() {
        let config = valid_config();
        assert_eq!(config.copy_mode, CopyMode::Files);
        assert!(config.preserve_folder_structure);
        assert_eq!(config.gitlab_base_url(), DEFAULT_GITLAB_BASE_URL);
        assert_eq!(config.effective_commit_message(), "Import hello");
    }

    #[test]
    fn test_redacted_blanks_tokens_only() {
        let redacted = valid_config().redacted();
        assert_eq!(redacted.github_token, "***");
        assert_eq!(redacted.gitlab_token, "***");
        assert_eq!(redacted.github_repo, "octocat/hello");
        assert_eq!(redacted.new_branch_name, "feature/import");
    }
}
