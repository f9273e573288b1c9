//! Pipeline step implementations
//!
//! Each step does its external work and returns an outcome or a
//! classified error; the driver loop owns all run-store bookkeeping, so
//! nothing here touches persistence. State produced by one step and
//! consumed by a later one travels through [`StepContext`].

use std::path::PathBuf;

use ferry_core::domain::config::PipelineConfig;
use ferry_core::domain::progress::ProgressEvent;
use ferry_core::domain::run::{PipelineResult, StepName};
use ferry_core::error::PipelineError;
use ferry_git::copy::{self, CopyStats};
use ferry_git::progress::CloneProgressParser;
use ferry_git::sanitize;
use ferry_git::{CancelToken, GitSync, PushOutcome};
use ferry_hosts::{
    CreateMergeRequest, GithubClient, GitlabClient, HostClient, MergeRequestInfo, ensure_branch,
};
use tracing::{info, warn};

use crate::service::progress::ProgressRegistry;

/// Message recorded on the step record when a step succeeds
#[derive(Debug)]
pub struct StepOutcome {
    pub message: String,
}

impl StepOutcome {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// State threaded through the five steps of one run
pub struct StepContext {
    pub config: PipelineConfig,
    pub operation_id: String,
    registry: ProgressRegistry,
    git: GitSync,
    github: GithubClient,
    gitlab: GitlabClient,
    source_dir: PathBuf,
    target_dir: PathBuf,
    copy_stats: CopyStats,
    push_outcome: Option<PushOutcome>,
    merge_request: Option<MergeRequestInfo>,
}

impl StepContext {
    pub fn new(config: PipelineConfig, operation_id: String, registry: ProgressRegistry) -> Self {
        let work_dir = PathBuf::from(&config.work_dir);
        let github = GithubClient::new(config.github_token.clone());
        let gitlab =
            GitlabClient::with_base_url(config.gitlab_base_url(), config.gitlab_token.clone());
        Self {
            source_dir: work_dir.join("source"),
            target_dir: work_dir.join("target"),
            config,
            operation_id,
            registry,
            git: GitSync::new(),
            github,
            gitlab,
            copy_stats: CopyStats::default(),
            push_outcome: None,
            merge_request: None,
        }
    }

    /// Success payload for the run record; present once the merge request
    /// has been opened.
    pub fn result(&self) -> Option<PipelineResult> {
        let mr = self.merge_request.as_ref()?;
        Some(PipelineResult {
            files_copied: self.copy_stats.files_copied,
            folders_copied: self.copy_stats.folders_copied,
            branch: self.config.new_branch_name.clone(),
            merge_request_id: mr.id,
            merge_request_iid: mr.iid,
            merge_request_url: mr.web_url.clone(),
        })
    }
}

/// Dispatches one named step against the shared context.
pub async fn run_step(name: StepName, ctx: &mut StepContext) -> Result<StepOutcome, PipelineError> {
    match name {
        StepName::CloneGithub => clone_github(ctx).await,
        StepName::CreateGitlabBranch => create_gitlab_branch(ctx).await,
        StepName::CopyFiles => copy_files(ctx).await,
        StepName::CommitChanges => commit_changes(ctx).await,
        StepName::CreateMergeRequest => create_merge_request(ctx).await,
    }
}

/// Step 1: acquire the source repository locally.
///
/// An existing clone in the working directory is reused with a remote
/// reset and fetch; a fresh clone streams git's progress output to the
/// operation's progress channel. Either way the channel sees a terminal
/// event before this step returns.
async fn clone_github(ctx: &mut StepContext) -> Result<StepOutcome, PipelineError> {
    if ctx.config.github_token.trim().is_empty() {
        return Err(PipelineError::Validation(
            "source credentials missing: github_token is empty".to_string(),
        ));
    }

    let project = match ctx.github.get_project(&ctx.config.github_repo).await {
        Ok(project) => project,
        Err(err) => {
            let err: PipelineError = err.into();
            ctx.registry.finish(
                &ctx.operation_id,
                ProgressEvent::error(&ctx.operation_id, err.to_string()),
            );
            return Err(err);
        }
    };
    let branch = ctx
        .config
        .github_branch
        .clone()
        .or_else(|| project.default_branch.clone());

    let remote_url = project
        .http_url
        .clone()
        .unwrap_or_else(|| format!("https://github.com/{}.git", ctx.config.github_repo));
    let url = sanitize::with_credentials(&remote_url, "x-access-token", &ctx.config.github_token);

    let operation_id = ctx.operation_id.clone();
    let registry = ctx.registry.clone();

    if GitSync::is_repo(&ctx.source_dir) {
        registry.publish(
            &operation_id,
            ProgressEvent::status(&operation_id, "Reusing existing source clone"),
        );
        match ctx
            .git
            .clone_or_update(&url, &ctx.source_dir, branch.as_deref())
            .await
        {
            Ok(_) => {
                registry.finish(
                    &operation_id,
                    ProgressEvent::complete(&operation_id, "Source repository ready"),
                );
                Ok(StepOutcome::new(format!(
                    "Reused existing clone of {} at {}",
                    ctx.config.github_repo,
                    ctx.source_dir.display()
                )))
            }
            Err(err) => {
                let err: PipelineError = err.into();
                registry.finish(
                    &operation_id,
                    ProgressEvent::error(&operation_id, err.to_string()),
                );
                Err(err)
            }
        }
    } else {
        let cancel = registry
            .cancel_token(&operation_id)
            .unwrap_or_else(CancelToken::new);
        let mut parser = CloneProgressParser::new();

        registry.publish(
            &operation_id,
            ProgressEvent::status(
                &operation_id,
                format!("Cloning {}", ctx.config.github_repo),
            ),
        );

        let result = ctx
            .git
            .clone_streaming(&url, &ctx.source_dir, branch.as_deref(), &cancel, |line| {
                if let Some(update) = parser.parse_line(line) {
                    registry.publish(
                        &operation_id,
                        ProgressEvent::progress(
                            &operation_id,
                            update.percentage,
                            update.phase,
                            line.to_string(),
                        ),
                    );
                }
            })
            .await;

        match result {
            Ok(()) => {
                registry.finish(
                    &operation_id,
                    ProgressEvent::complete(&operation_id, "Clone complete"),
                );
                Ok(StepOutcome::new(format!(
                    "Cloned {} ({}) to {}",
                    ctx.config.github_repo,
                    branch.as_deref().unwrap_or("default branch"),
                    ctx.source_dir.display()
                )))
            }
            Err(err) => {
                let err: PipelineError = err.into();
                registry.finish(
                    &operation_id,
                    ProgressEvent::error(&operation_id, err.to_string()),
                );
                Err(err)
            }
        }
    }
}

/// Step 2: create the target branch remotely (idempotently) and check it
/// out in a local clone, reusing an existing clone when present.
async fn create_gitlab_branch(ctx: &mut StepContext) -> Result<StepOutcome, PipelineError> {
    let project = ctx.gitlab.get_project(&ctx.config.gitlab_project).await?;

    let (_branch, created) = ensure_branch(
        &ctx.gitlab,
        &ctx.config.gitlab_project,
        &ctx.config.new_branch_name,
        &ctx.config.target_base_branch,
    )
    .await?;

    let remote_url = project.http_url.clone().unwrap_or_else(|| {
        format!(
            "{}/{}.git",
            ctx.config.gitlab_base_url(),
            project.full_path
        )
    });
    let url = sanitize::with_credentials(&remote_url, "oauth2", &ctx.config.gitlab_token);

    let reused = ctx.git.clone_or_update(&url, &ctx.target_dir, None).await?;
    ctx.git
        .checkout_branch(&ctx.target_dir, &ctx.config.new_branch_name, true)
        .await?;

    Ok(StepOutcome::new(format!(
        "Branch {} {}; checked out at {} ({})",
        ctx.config.new_branch_name,
        if created { "created" } else { "already existed" },
        ctx.target_dir.display(),
        if reused {
            "reused existing clone"
        } else {
            "fresh clone"
        },
    )))
}

/// Step 3: place the selected file subset into the target checkout.
/// Conflicting destination entries are deleted first, never merged.
async fn copy_files(ctx: &mut StepContext) -> Result<StepOutcome, PipelineError> {
    let source_root = match &ctx.config.source_subpath {
        Some(sub) => copy::resolve_path(&ctx.source_dir, sub),
        None => ctx.source_dir.clone(),
    };
    let dest_root = match &ctx.config.dest_subpath {
        Some(sub) => copy::resolve_path(&ctx.target_dir, sub),
        None => ctx.target_dir.clone(),
    };

    if !source_root.exists() {
        return Err(PipelineError::NotFound(format!(
            "copy source does not exist: {}",
            source_root.display()
        )));
    }

    let stats = match copy::select_entries(
        ctx.config.copy_mode,
        &ctx.config.files,
        &ctx.config.folders,
    ) {
        None => {
            info!("no copy patterns configured, copying the entire source tree");
            copy::copy_tree(&source_root, &dest_root, true)?
        }
        Some(entries) => {
            let mut stats = CopyStats::default();
            for entry in &entries {
                stats.absorb(copy::copy_entry(
                    &source_root,
                    &dest_root,
                    entry,
                    ctx.config.preserve_folder_structure,
                )?);
            }
            stats
        }
    };

    ctx.copy_stats = stats;
    Ok(StepOutcome::new(format!(
        "Copied {} files and {} folders into {}",
        stats.files_copied,
        stats.folders_copied,
        dest_root.display()
    )))
}

/// Step 4: stage, commit (skipped on a clean tree), and push with
/// conflict resolution.
async fn commit_changes(ctx: &mut StepContext) -> Result<StepOutcome, PipelineError> {
    ctx.git.stage_all(&ctx.target_dir).await?;

    let commit_note = if ctx.git.is_clean(&ctx.target_dir).await? {
        info!("working tree is clean, nothing to commit");
        "working tree clean, commit skipped".to_string()
    } else {
        ctx.git
            .commit(&ctx.target_dir, ctx.config.effective_commit_message())
            .await?;
        "changes committed".to_string()
    };

    let outcome = ctx
        .git
        .push_with_conflict_resolution(&ctx.target_dir, &ctx.config.new_branch_name)
        .await?;
    if outcome.was_forced() {
        warn!(
            "branch {} landed via destructive fallback: {}",
            ctx.config.new_branch_name,
            outcome.describe()
        );
    }
    ctx.push_outcome = Some(outcome);

    Ok(StepOutcome::new(format!(
        "{}; {}",
        commit_note,
        outcome.describe()
    )))
}

/// Step 5: open the merge request from the new branch to the base branch.
async fn create_merge_request(ctx: &mut StepContext) -> Result<StepOutcome, PipelineError> {
    let mr = ctx
        .gitlab
        .create_merge_request(
            &ctx.config.gitlab_project,
            CreateMergeRequest {
                source_branch: ctx.config.new_branch_name.clone(),
                target_branch: ctx.config.target_base_branch.clone(),
                title: ctx.config.mr_title.clone(),
                description: ctx.config.mr_description.clone(),
            },
        )
        .await?;

    info!("merge request {} opened: {}", mr.id, mr.web_url);
    let message = match mr.iid {
        Some(iid) => format!("Merge request !{} opened: {}", iid, mr.web_url),
        None => format!("Merge request opened: {}", mr.web_url),
    };
    ctx.merge_request = Some(mr);

    Ok(StepOutcome::new(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::progress::ProgressRegistry;

    fn test_config() -> PipelineConfig {
        serde_json::from_value(serde_json::json!({
            "github_repo": "octocat/hello",
            "github_token": "gh-token",
            "gitlab_project": "group/project",
            "gitlab_token": "gl-token",
            "target_base_branch": "main",
            "new_branch_name": "feature/import",
            "work_dir": "/tmp/ferry-run-1",
            "mr_title": "Import"
        }))
        .unwrap()
    }

    #[test]
    fn test_context_splits_work_dir_into_source_and_target() {
        let ctx = StepContext::new(
            test_config(),
            "op-1".to_string(),
            ProgressRegistry::new(),
        );
        assert_eq!(ctx.source_dir, PathBuf::from("/tmp/ferry-run-1/source"));
        assert_eq!(ctx.target_dir, PathBuf::from("/tmp/ferry-run-1/target"));
    }

    #[test]
    fn test_result_requires_merge_request() {
        let mut ctx = StepContext::new(
            test_config(),
            "op-1".to_string(),
            ProgressRegistry::new(),
        );
        assert!(ctx.result().is_none());

        ctx.copy_stats = CopyStats {
            files_copied: 3,
            folders_copied: 1,
        };
        ctx.merge_request = Some(MergeRequestInfo {
            id: 42,
            iid: Some(7),
            web_url: "https://gitlab.com/group/project/-/merge_requests/7".to_string(),
        });

        let result = ctx.result().unwrap();
        assert_eq!(result.files_copied, 3);
        assert_eq!(result.folders_copied, 1);
        assert_eq!(result.branch, "feature/import");
        assert_eq!(result.merge_request_id, 42);
        assert_eq!(result.merge_request_iid, Some(7));
    }
}
