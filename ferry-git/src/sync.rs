//! Git synchronization
//!
//! Clone/update of working directories, branch checkout, staging and
//! committing, and the conflict-resolving push sequence. The remote is a
//! shared, externally-mutable resource: when an automatic merge cannot
//! resolve a concurrent change, the algorithm trades content preservation
//! for guaranteed pipeline completion and force-pushes the local state.
//! Every force is logged as destructive, never applied silently.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::GitError;
use crate::process::{CancelToken, GitOutput, GitRunner};
use crate::sanitize::{redact_credentials, sanitize_commit_message, validate_branch_name};

/// Upper bound for a fetch/clone of the source repository
pub const CLONE_TIMEOUT: Duration = Duration::from_secs(300);

/// How the push sequence ultimately landed the local branch on the remote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Accepted on the first attempt
    FastForward,
    /// Rejected once, resolved by an automatic merge pull, then accepted
    MergedThenPushed,
    /// Automatic merge failed or the retry was rejected; the remote was
    /// overwritten conditioned on our last-known view of its ref
    ForcedWithLease,
    /// The lease was stale; the remote was overwritten unconditionally
    Forced,
}

impl PushOutcome {
    pub fn describe(&self) -> &'static str {
        match self {
            PushOutcome::FastForward => "pushed (fast-forward)",
            PushOutcome::MergedThenPushed => "pushed after merging remote changes",
            PushOutcome::ForcedWithLease => "force-pushed with lease after unresolvable conflict",
            PushOutcome::Forced => "force-pushed (lease was stale)",
        }
    }

    pub fn was_forced(&self) -> bool {
        matches!(self, PushOutcome::ForcedWithLease | PushOutcome::Forced)
    }
}

/// Local git operations for one working directory
#[derive(Debug, Clone, Default)]
pub struct GitSync {
    runner: GitRunner,
}

impl GitSync {
    pub fn new() -> Self {
        Self {
            runner: GitRunner::new(),
        }
    }

    pub fn with_runner(runner: GitRunner) -> Self {
        Self { runner }
    }

    /// True when `dir` already holds a clone, checked via the presence of
    /// the git metadata directory.
    pub fn is_repo(dir: &Path) -> bool {
        dir.join(".git").exists()
    }

    /// Clones `url` into `dir`, or reuses an existing clone by resetting
    /// its remote URL and fetching. Returns true when the clone was
    /// reused.
    pub async fn clone_or_update(
        &self,
        url: &str,
        dir: &Path,
        branch: Option<&str>,
    ) -> Result<bool, GitError> {
        if Self::is_repo(dir) {
            info!("reusing existing clone at {}", dir.display());
            self.set_remote_url(dir, url).await?;
            self.runner
                .run_checked(&["fetch", "origin"], Some(dir))
                .await?;
            if let Some(branch) = branch {
                validate_branch_name(branch)?;
                self.runner
                    .run_checked(&["checkout", branch], Some(dir))
                    .await?;
                self.runner
                    .run_checked(&["pull", "--ff-only", "origin", branch], Some(dir))
                    .await?;
            }
            return Ok(true);
        }

        if let Some(parent) = dir.parent() {
            std::fs::create_dir_all(parent)?;
        }
        info!(
            "cloning {} into {}",
            redact_credentials(url),
            dir.display()
        );
        let dir_str = dir.to_string_lossy();
        let mut args = vec!["clone"];
        if let Some(branch) = branch {
            validate_branch_name(branch)?;
            args.extend(["--branch", branch]);
        }
        args.push(url);
        args.push(&dir_str);
        self.runner.run_checked(&args, None).await?;
        Ok(false)
    }

    /// Clones with `--progress`, streaming every output line to `on_line`.
    /// Killed through the token or after [`CLONE_TIMEOUT`].
    pub async fn clone_streaming(
        &self,
        url: &str,
        dir: &Path,
        branch: Option<&str>,
        cancel: &CancelToken,
        on_line: impl FnMut(&str),
    ) -> Result<(), GitError> {
        if let Some(parent) = dir.parent() {
            std::fs::create_dir_all(parent)?;
        }
        info!(
            "cloning {} into {} with progress",
            redact_credentials(url),
            dir.display()
        );

        let dir_str = dir.to_string_lossy();
        let mut args = vec!["clone", "--progress"];
        if let Some(branch) = branch {
            validate_branch_name(branch)?;
            args.extend(["--branch", branch]);
        }
        args.push(url);
        args.push(&dir_str);

        let runner = GitRunner::with_timeout(CLONE_TIMEOUT);
        let output = runner.run_streaming(&args, None, cancel, on_line).await?;
        if !output.success() {
            return Err(GitError::CommandFailed {
                args: "clone --progress".to_string(),
                code: output.exit_code,
                stderr: redact_credentials(output.stderr.trim()),
            });
        }
        Ok(())
    }

    pub async fn set_remote_url(&self, dir: &Path, url: &str) -> Result<(), GitError> {
        self.runner
            .run_checked(&["remote", "set-url", "origin", url], Some(dir))
            .await?;
        Ok(())
    }

    pub async fn fetch(&self, dir: &Path) -> Result<(), GitError> {
        self.runner
            .run_checked(&["fetch", "origin"], Some(dir))
            .await?;
        Ok(())
    }

    /// Checks out `branch`, creating or resetting it. When the remote
    /// branch exists the local branch starts from it.
    pub async fn checkout_branch(
        &self,
        dir: &Path,
        branch: &str,
        track_remote: bool,
    ) -> Result<(), GitError> {
        validate_branch_name(branch)?;

        if track_remote {
            let remote_ref = format!("origin/{}", branch);
            let exists = self
                .runner
                .run(
                    &["rev-parse", "--verify", "--quiet", &remote_ref],
                    Some(dir),
                )
                .await?;
            if exists.success() {
                self.runner
                    .run_checked(&["checkout", "-B", branch, &remote_ref], Some(dir))
                    .await?;
                return Ok(());
            }
        }

        self.runner
            .run_checked(&["checkout", "-B", branch], Some(dir))
            .await?;
        Ok(())
    }

    pub async fn stage_all(&self, dir: &Path) -> Result<(), GitError> {
        self.runner.run_checked(&["add", "-A"], Some(dir)).await?;
        Ok(())
    }

    /// True when the working tree has no staged or unstaged changes.
    pub async fn is_clean(&self, dir: &Path) -> Result<bool, GitError> {
        let output = self
            .runner
            .run_checked(&["status", "--porcelain"], Some(dir))
            .await?;
        Ok(output.stdout.trim().is_empty())
    }

    pub async fn commit(&self, dir: &Path, message: &str) -> Result<(), GitError> {
        let message = sanitize_commit_message(message);
        self.runner
            .run_checked(&["commit", "-m", &message], Some(dir))
            .await?;
        Ok(())
    }

    /// Pushes `branch` to origin, resolving non-fast-forward rejections:
    ///
    /// 1. direct push;
    /// 2. on rejection, fetch + merge-based pull, then one retry;
    /// 3. if the merge conflicts or the retry is rejected, force-with-lease;
    ///    a stale lease falls back to one plain force push.
    ///
    /// Both force paths are logged as destructive.
    pub async fn push_with_conflict_resolution(
        &self,
        dir: &Path,
        branch: &str,
    ) -> Result<PushOutcome, GitError> {
        validate_branch_name(branch)?;

        let first = self
            .runner
            .run(&["push", "origin", branch], Some(dir))
            .await?;
        if first.success() {
            debug!("push of {} accepted directly", branch);
            return Ok(PushOutcome::FastForward);
        }
        if !is_non_fast_forward(&first.stderr) {
            return Err(push_failure(branch, &first));
        }

        warn!(
            "push of {} rejected as non-fast-forward; attempting merge-based pull",
            branch
        );
        self.fetch(dir).await?;
        let pull = self
            .runner
            .run(
                &["pull", "--no-rebase", "--no-edit", "origin", branch],
                Some(dir),
            )
            .await?;

        if pull.success() {
            let retry = self
                .runner
                .run(&["push", "origin", branch], Some(dir))
                .await?;
            if retry.success() {
                info!("push of {} accepted after merging remote changes", branch);
                return Ok(PushOutcome::MergedThenPushed);
            }
            if !is_non_fast_forward(&retry.stderr) {
                return Err(push_failure(branch, &retry));
            }
            warn!("push of {} still rejected after merge", branch);
        } else {
            warn!(
                "automatic merge of {} failed, aborting merge: {}",
                branch,
                pull.stderr.trim()
            );
            // Leave no half-merged tree behind; failure here is fine when
            // no merge was in progress.
            let _ = self.runner.run(&["merge", "--abort"], Some(dir)).await;
        }

        warn!(
            "DESTRUCTIVE: force-pushing {} with lease; remote changes the merge could not resolve will be overwritten",
            branch
        );
        let lease = self
            .runner
            .run(&["push", "--force-with-lease", "origin", branch], Some(dir))
            .await?;
        if lease.success() {
            return Ok(PushOutcome::ForcedWithLease);
        }

        warn!(
            "DESTRUCTIVE: lease for {} was stale, falling back to plain force push",
            branch
        );
        self.runner
            .run_checked(&["push", "--force", "origin", branch], Some(dir))
            .await?;
        Ok(PushOutcome::Forced)
    }
}

/// Matches the textual markers git emits when a push is rejected because
/// the remote holds commits the local branch lacks.
pub(crate) fn is_non_fast_forward(stderr: &str) -> bool {
    stderr.contains("[rejected]")
        || stderr.contains("non-fast-forward")
        || stderr.contains("fetch first")
        || stderr.contains("failed to push some refs")
        || stderr.contains("stale info")
}

fn push_failure(branch: &str, output: &GitOutput) -> GitError {
    GitError::CommandFailed {
        args: format!("push origin {}", branch),
        code: output.exit_code,
        stderr: redact_credentials(output.stderr.trim()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_repo_checks_metadata_dir() {
        let dir = TempDir::new().unwrap();
        assert!(!GitSync::is_repo(dir.path()));

        std::fs::create_dir(dir.path().join(".git")).unwrap();
        assert!(GitSync::is_repo(dir.path()));
    }

    #[test]
    fn test_non_fast_forward_markers() {
        let rejected = "To gitlab.com:group/project.git\n ! [rejected]  feature -> feature (non-fast-forward)\nerror: failed to push some refs";
        assert!(is_non_fast_forward(rejected));

        let hint = "hint: Updates were rejected because the remote contains work that you do\nhint: not have locally. ... 'git pull ...') before pushing again. fetch first";
        assert!(is_non_fast_forward(hint));

        assert!(!is_non_fast_forward(
            "fatal: Authentication failed for 'https://gitlab.com/group/project.git'"
        ));
        assert!(!is_non_fast_forward(""));
    }

    #[test]
    fn test_push_outcome_flags_forces() {
        assert!(!PushOutcome::FastForward.was_forced());
        assert!(!PushOutcome::MergedThenPushed.was_forced());
        assert!(PushOutcome::ForcedWithLease.was_forced());
        assert!(PushOutcome::Forced.was_forced());
        assert!(PushOutcome::ForcedWithLease.describe().contains("lease"));
    }
}
