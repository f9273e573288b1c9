//! Ferry Hosts
//!
//! Type-safe HTTP clients for the two hosting providers the pipeline
//! talks to: GitHub on the source side and GitLab on the target side.
//! Both expose the same four operations behind the [`HostClient`] trait;
//! error statuses map onto the shared pipeline error taxonomy.

pub mod error;
mod github;
mod gitlab;
pub mod types;

pub use error::{HostError, Result};
pub use github::GithubClient;
pub use gitlab::GitlabClient;
pub use types::{Branch, CreateBranch, CreateMergeRequest, MergeRequestInfo, ProjectInfo};

use async_trait::async_trait;
use tracing::info;

/// The remote operations the pipeline needs from a hosting provider
#[async_trait]
pub trait HostClient: Send + Sync {
    async fn get_project(&self, project: &str) -> Result<ProjectInfo>;

    async fn list_branches(&self, project: &str) -> Result<Vec<Branch>>;

    /// Creates a branch; a concurrent creation of the same name surfaces
    /// as [`HostError::BranchAlreadyExists`].
    async fn create_branch(&self, project: &str, req: CreateBranch) -> Result<Branch>;

    async fn create_merge_request(
        &self,
        project: &str,
        req: CreateMergeRequest,
    ) -> Result<MergeRequestInfo>;
}

/// Idempotently ensures `name` exists on the remote, created from `base`.
///
/// An existing branch is returned as-is. A creation that loses the race
/// to a concurrent run (or a manual creation) is treated as success and
/// the existing branch is re-fetched, never surfaced as a failure.
///
/// Returns the branch and whether this call created it.
pub async fn ensure_branch(
    client: &dyn HostClient,
    project: &str,
    name: &str,
    base: &str,
) -> Result<(Branch, bool)> {
    let existing = client
        .list_branches(project)
        .await?
        .into_iter()
        .find(|b| b.name == name);
    if let Some(branch) = existing {
        info!("branch {} already exists on {}", name, project);
        return Ok((branch, false));
    }

    match client
        .create_branch(
            project,
            CreateBranch {
                name: name.to_string(),
                base_ref: base.to_string(),
            },
        )
        .await
    {
        Ok(branch) => Ok((branch, true)),
        Err(HostError::BranchAlreadyExists(_)) => {
            info!(
                "branch {} was created concurrently on {}, re-fetching",
                name, project
            );
            let branch = client
                .list_branches(project)
                .await?
                .into_iter()
                .find(|b| b.name == name)
                .ok_or_else(|| HostError::NotFound {
                    provider: "host",
                    message: format!(
                        "branch {} reported as existing but absent from listing",
                        name
                    ),
                })?;
            Ok((branch, false))
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Scripted fake provider for exercising the idempotent-creation path
    struct FakeHost {
        branches: Mutex<Vec<Branch>>,
        /// When set, create_branch fails as if another run won the race
        race_on_create: bool,
        create_calls: Mutex<u32>,
    }

    impl FakeHost {
        fn with_branches(names: &[&str]) -> Self {
            Self {
                branches: Mutex::new(
                    names
                        .iter()
                        .map(|n| Branch {
                            name: n.to_string(),
                            commit_sha: Some("abc123".to_string()),
                        })
                        .collect(),
                ),
                race_on_create: false,
                create_calls: Mutex::new(0),
            }
        }

        fn racing(names: &[&str]) -> Self {
            let mut host = Self::with_branches(names);
            host.race_on_create = true;
            host
        }
    }

    #[async_trait]
    impl HostClient for FakeHost {
        async fn get_project(&self, project: &str) -> Result<ProjectInfo> {
            Ok(ProjectInfo {
                id: Some(1),
                name: project.to_string(),
                full_path: project.to_string(),
                default_branch: Some("main".to_string()),
                http_url: None,
            })
        }

        async fn list_branches(&self, _project: &str) -> Result<Vec<Branch>> {
            Ok(self.branches.lock().unwrap().clone())
        }

        async fn create_branch(&self, _project: &str, req: CreateBranch) -> Result<Branch> {
            *self.create_calls.lock().unwrap() += 1;
            let mut branches = self.branches.lock().unwrap();
            if self.race_on_create || branches.iter().any(|b| b.name == req.name) {
                // Simulates the concurrent creation landing first.
                branches.push(Branch {
                    name: req.name.clone(),
                    commit_sha: Some("raced".to_string()),
                });
                return Err(HostError::BranchAlreadyExists(req.name));
            }
            let branch = Branch {
                name: req.name,
                commit_sha: Some("created".to_string()),
            };
            branches.push(branch.clone());
            Ok(branch)
        }

        async fn create_merge_request(
            &self,
            _project: &str,
            _req: CreateMergeRequest,
        ) -> Result<MergeRequestInfo> {
            Ok(MergeRequestInfo {
                id: 10,
                iid: Some(1),
                web_url: "https://example.com/mr/1".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_ensure_branch_creates_when_absent() {
        let host = FakeHost::with_branches(&["main"]);
        let (branch, created) = ensure_branch(&host, "group/project", "feature", "main")
            .await
            .unwrap();
        assert!(created);
        assert_eq!(branch.name, "feature");
        assert_eq!(*host.create_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ensure_branch_reuses_existing_without_creating() {
        let host = FakeHost::with_branches(&["main", "feature"]);
        let (branch, created) = ensure_branch(&host, "group/project", "feature", "main")
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(branch.name, "feature");
        assert_eq!(*host.create_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ensure_branch_treats_creation_race_as_success() {
        let host = FakeHost::racing(&["main"]);
        let (branch, created) = ensure_branch(&host, "group/project", "feature", "main")
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(branch.name, "feature");
    }

    #[tokio::test]
    async fn test_ensure_branch_twice_is_idempotent() {
        let host = FakeHost::with_branches(&["main"]);
        let (first, created_first) = ensure_branch(&host, "p", "feature", "main")
            .await
            .unwrap();
        let (second, created_second) = ensure_branch(&host, "p", "feature", "main")
            .await
            .unwrap();
        assert!(created_first);
        assert!(!created_second);
        assert_eq!(first.name, second.name);
    }
}
