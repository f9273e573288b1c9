//! Error types for the hosting API clients

use ferry_core::error::PipelineError;
use thiserror::Error;

/// Result type alias for host client operations
pub type Result<T> = std::result::Result<T, HostError>;

/// Errors surfaced by a remote hosting provider
#[derive(Debug, Error)]
pub enum HostError {
    /// HTTP transport failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Credential rejected (HTTP 401)
    #[error("authentication rejected by {provider}: {message}")]
    Authentication { provider: &'static str, message: String },

    /// Credential valid but insufficient, or rate-limited (HTTP 403/429)
    #[error("access denied by {provider}: {message}")]
    Forbidden { provider: &'static str, message: String },

    /// Project, branch, or ref absent (HTTP 404)
    #[error("{provider} resource not found: {message}")]
    NotFound { provider: &'static str, message: String },

    /// Branch creation raced a concurrent creation of the same name
    #[error("branch already exists: {0}")]
    BranchAlreadyExists(String),

    /// Any other API error status
    #[error("{provider} API error (status {status}): {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    /// Response body did not match the expected shape
    #[error("failed to parse {provider} response: {message}")]
    Parse { provider: &'static str, message: String },
}

impl HostError {
    /// Classifies a non-success HTTP status into the error taxonomy.
    pub fn from_status(provider: &'static str, status: u16, message: String) -> Self {
        match status {
            401 => HostError::Authentication { provider, message },
            403 | 429 => HostError::Forbidden { provider, message },
            404 => HostError::NotFound { provider, message },
            _ => HostError::Api {
                provider,
                status,
                message,
            },
        }
    }
}

impl From<HostError> for PipelineError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::Authentication { .. } => PipelineError::Authentication(err.to_string()),
            HostError::Forbidden { .. } => PipelineError::Authorization(err.to_string()),
            HostError::NotFound { .. } => PipelineError::NotFound(err.to_string()),
            other => PipelineError::Integration(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            HostError::from_status("gitlab", 401, "bad token".into()),
            HostError::Authentication { .. }
        ));
        assert!(matches!(
            HostError::from_status("gitlab", 403, "forbidden".into()),
            HostError::Forbidden { .. }
        ));
        assert!(matches!(
            HostError::from_status("github", 429, "rate limited".into()),
            HostError::Forbidden { .. }
        ));
        assert!(matches!(
            HostError::from_status("github", 404, "missing".into()),
            HostError::NotFound { .. }
        ));
        assert!(matches!(
            HostError::from_status("github", 500, "oops".into()),
            HostError::Api { status: 500, .. }
        ));
    }

    #[test]
    fn test_taxonomy_mapping() {
        let err: PipelineError =
            HostError::from_status("gitlab", 401, "denied".into()).into();
        assert_eq!(err.kind(), "authentication");

        let err: PipelineError =
            HostError::from_status("gitlab", 403, "denied".into()).into();
        assert_eq!(err.kind(), "authorization");

        let err: PipelineError = HostError::BranchAlreadyExists("feature".into()).into();
        assert_eq!(err.kind(), "integration");
    }
}
