//! Pipeline run domain types
//!
//! A run is one end-to-end execution of the fixed five-step migration
//! pipeline. The orchestrator persists it; clients poll it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::config::PipelineConfig;

/// One pipeline execution instance.
///
/// Structure shared between the orchestrator (persists, mutates) and
/// clients (read-only polling).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub owner_id: String,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    /// Immutable snapshot of the submitted inputs, credentials redacted.
    pub configuration: PipelineConfig,
    /// Exactly five records in execution order; never reordered or resized.
    pub steps: Vec<StepRecord>,
    pub result: Option<PipelineResult>,
    pub error_detail: Option<ErrorDetail>,
}

impl PipelineRun {
    /// Creates a fresh run with all five steps idle.
    pub fn new(owner_id: String, configuration: PipelineConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            status: RunStatus::InProgress,
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
            configuration,
            steps: StepName::ALL.iter().map(|n| StepRecord::idle(*n)).collect(),
            result: None,
            error_detail: None,
        }
    }
}

/// Run-level execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::InProgress => "in_progress",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::InProgress)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(RunStatus::InProgress),
            "success" => Ok(RunStatus::Success),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status: {}", other)),
        }
    }
}

/// The five fixed pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepName {
    CloneGithub,
    CreateGitlabBranch,
    CopyFiles,
    CommitChanges,
    CreateMergeRequest,
}

impl StepName {
    /// Execution order of the pipeline. The orchestrator iterates this
    /// array; it is the single source of truth for step ordering.
    pub const ALL: [StepName; 5] = [
        StepName::CloneGithub,
        StepName::CreateGitlabBranch,
        StepName::CopyFiles,
        StepName::CommitChanges,
        StepName::CreateMergeRequest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::CloneGithub => "clone-github",
            StepName::CreateGitlabBranch => "create-gitlab-branch",
            StepName::CopyFiles => "copy-files",
            StepName::CommitChanges => "commit-changes",
            StepName::CreateMergeRequest => "create-merge-request",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clone-github" => Ok(StepName::CloneGithub),
            "create-gitlab-branch" => Ok(StepName::CreateGitlabBranch),
            "copy-files" => Ok(StepName::CopyFiles),
            "commit-changes" => Ok(StepName::CommitChanges),
            "create-merge-request" => Ok(StepName::CreateMergeRequest),
            other => Err(format!("unknown step name: {}", other)),
        }
    }
}

/// Per-step execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Idle,
    InProgress,
    Success,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Success | StepStatus::Failed)
    }
}

/// One pipeline stage's progress.
///
/// Mutated only by the orchestrator, and only forward:
/// idle -> in_progress -> success | failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: StepName,
    pub status: StepStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub message: Option<String>,
    pub error_message: Option<String>,
}

impl StepRecord {
    pub fn idle(name: StepName) -> Self {
        Self {
            name,
            status: StepStatus::Idle,
            start_time: None,
            end_time: None,
            duration_ms: None,
            message: None,
            error_message: None,
        }
    }

    /// Applies a status transition, stamping timestamps as a side effect:
    /// entering `InProgress` sets `start_time`; entering a terminal status
    /// sets `end_time` and computes `duration_ms`.
    ///
    /// Rejects backwards moves and any write after a terminal status.
    pub fn transition(
        &mut self,
        status: StepStatus,
        message: Option<String>,
        error_message: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        let legal = matches!(
            (self.status, status),
            (StepStatus::Idle, StepStatus::InProgress)
                | (StepStatus::InProgress, StepStatus::Success)
                | (StepStatus::InProgress, StepStatus::Failed)
        );
        if !legal {
            return Err(InvalidTransition {
                step: self.name,
                from: self.status,
                to: status,
            });
        }

        self.status = status;
        match status {
            StepStatus::InProgress => self.start_time = Some(at),
            StepStatus::Success | StepStatus::Failed => {
                self.end_time = Some(at);
                if let Some(start) = self.start_time {
                    self.duration_ms = Some((at - start).num_milliseconds());
                }
            }
            StepStatus::Idle => {}
        }
        if message.is_some() {
            self.message = message;
        }
        if error_message.is_some() {
            self.error_message = error_message;
        }
        Ok(())
    }
}

/// Attempted step transition that would violate the monotonic lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub step: StepName,
    pub from: StepStatus,
    pub to: StepStatus,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "illegal transition for step {}: {:?} -> {:?}",
            self.step, self.from, self.to
        )
    }
}

impl std::error::Error for InvalidTransition {}

/// Payload recorded when all five steps succeed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub files_copied: u64,
    pub folders_copied: u64,
    pub branch: String,
    pub merge_request_id: i64,
    pub merge_request_iid: Option<i64>,
    pub merge_request_url: String,
}

/// Failing step and message recorded when a run fails
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub step: StepName,
    pub message: String,
}

/// Aggregate counters over a set of runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStats {
    pub success_count: i64,
    pub failed_count: i64,
    pub in_progress_count: i64,
    pub average_duration_ms: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::PipelineConfig;
    use chrono::Duration;

    fn test_config() -> PipelineConfig {
        serde_json::from_value(serde_json::json!({
            "github_repo": "octocat/hello",
            "github_token": "gh-token",
            "gitlab_project": "group/project",
            "gitlab_token": "gl-token",
            "target_base_branch": "main",
            "new_branch_name": "feature/import",
            "work_dir": "/tmp/ferry-test",
            "mr_title": "Import"
        }))
        .unwrap()
    }

    #[test]
    fn test_new_run_has_five_idle_steps_in_order() {
        let run = PipelineRun::new("alice".to_string(), test_config());

        assert_eq!(run.status, RunStatus::InProgress);
        assert_eq!(run.steps.len(), 5);
        for (record, expected) in run.steps.iter().zip(StepName::ALL) {
            assert_eq!(record.name, expected);
            assert_eq!(record.status, StepStatus::Idle);
            assert!(record.start_time.is_none());
        }
        assert!(run.end_time.is_none());
        assert!(run.result.is_none());
        assert!(run.error_detail.is_none());
    }

    #[test]
    fn test_step_transition_stamps_times_and_duration() {
        let mut record = StepRecord::idle(StepName::CloneGithub);
        let started = Utc::now();

        record
            .transition(StepStatus::InProgress, None, None, started)
            .unwrap();
        assert_eq!(record.start_time, Some(started));
        assert!(record.end_time.is_none());

        let finished = started + Duration::milliseconds(1500);
        record
            .transition(
                StepStatus::Success,
                Some("cloned".to_string()),
                None,
                finished,
            )
            .unwrap();
        assert_eq!(record.end_time, Some(finished));
        assert_eq!(record.duration_ms, Some(1500));
        assert_eq!(record.message.as_deref(), Some("cloned"));
    }

    #[test]
    fn test_step_transition_rejects_backwards_and_post_terminal_moves() {
        let mut record = StepRecord::idle(StepName::CopyFiles);
        let now = Utc::now();

        // Idle cannot jump straight to a terminal status.
        assert!(
            record
                .transition(StepStatus::Success, None, None, now)
                .is_err()
        );

        record
            .transition(StepStatus::InProgress, None, None, now)
            .unwrap();
        record
            .transition(StepStatus::Failed, None, Some("boom".to_string()), now)
            .unwrap();

        // Terminal is final.
        assert!(
            record
                .transition(StepStatus::InProgress, None, None, now)
                .is_err()
        );
        assert!(
            record
                .transition(StepStatus::Success, None, None, now)
                .is_err()
        );
        assert_eq!(record.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_step_name_wire_format() {
        let json = serde_json::to_string(&StepName::CreateGitlabBranch).unwrap();
        assert_eq!(json, "\"create-gitlab-branch\"");

        let parsed: StepName = "commit-changes".parse().unwrap();
        assert_eq!(parsed, StepName::CommitChanges);
        assert!("no-such-step".parse::<StepName>().is_err());
    }

    #[test]
    fn test_run_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&RunStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!("failed".parse::<RunStatus>().unwrap(), RunStatus::Failed);
        assert!(RunStatus::Failed.is_terminal());
        assert!(!RunStatus::InProgress.is_terminal());
    }
}
