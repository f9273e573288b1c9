//! Error types for local git operations

use ferry_core::error::PipelineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitError {
    /// The command ran and exited non-zero
    #[error("git {args} failed with exit code {code}: {stderr}")]
    CommandFailed {
        args: String,
        code: i32,
        stderr: String,
    },

    /// The command exceeded its time bound and was killed
    #[error("git {args} timed out after {seconds}s")]
    Timeout { args: String, seconds: u64 },

    /// The command was killed through its cancel token
    #[error("git operation cancelled")]
    Cancelled,

    /// Rejected before reaching the argv array
    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<GitError> for PipelineError {
    fn from(err: GitError) -> Self {
        match err {
            GitError::Timeout { .. } => PipelineError::Timeout(err.to_string()),
            GitError::Cancelled => PipelineError::Cancelled("fetch cancelled".to_string()),
            GitError::InvalidBranchName(name) => {
                PipelineError::Validation(format!("invalid branch name: {}", name))
            }
            other => PipelineError::Integration(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_mapping() {
        let err: PipelineError = GitError::Timeout {
            args: "clone".to_string(),
            seconds: 300,
        }
        .into();
        assert_eq!(err.kind(), "timeout");

        let err: PipelineError = GitError::Cancelled.into();
        assert_eq!(err.kind(), "cancelled");

        let err: PipelineError = GitError::CommandFailed {
            args: "push origin main".to_string(),
            code: 1,
            stderr: "remote hung up".to_string(),
        }
        .into();
        assert_eq!(err.kind(), "integration");
        assert!(err.to_string().contains("remote hung up"));
    }
}
