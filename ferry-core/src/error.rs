//! Pipeline error taxonomy
//!
//! Every failure a step can produce is classified into one of these
//! variants before it is written to the run record. Client crates convert
//! their own error types into this taxonomy via `From` impls.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// Missing or malformed input, rejected before any side effect
    #[error("validation failed: {0}")]
    Validation(String),

    /// Credential rejected by a remote host
    #[error("authentication rejected: {0}")]
    Authentication(String),

    /// Credential valid but insufficient permission (or rate-limited)
    #[error("permission denied: {0}")]
    Authorization(String),

    /// Referenced project, branch, or run is absent
    #[error("not found: {0}")]
    NotFound(String),

    /// Generic failure of an external call or subprocess; carries the raw
    /// underlying message
    #[error("integration failure: {0}")]
    Integration(String),

    /// External fetch exceeded its bound
    #[error("timed out: {0}")]
    Timeout(String),

    /// Explicit user cancellation
    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl PipelineError {
    /// Short classifier used in logs and step error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation",
            PipelineError::Authentication(_) => "authentication",
            PipelineError::Authorization(_) => "authorization",
            PipelineError::NotFound(_) => "not_found",
            PipelineError::Integration(_) => "integration",
            PipelineError::Timeout(_) => "timeout",
            PipelineError::Cancelled(_) => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_display() {
        let err = PipelineError::Authentication("bad token".to_string());
        assert_eq!(err.kind(), "authentication");
        assert_eq!(err.to_string(), "authentication rejected: bad token");

        let err = PipelineError::Timeout("clone exceeded 300s".to_string());
        assert_eq!(err.kind(), "timeout");
    }
}
