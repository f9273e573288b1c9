//! Progress event types
//!
//! Transient events emitted during the fetch step. They are pushed to live
//! subscribers and never persisted; once the owning channel is torn down
//! they are gone.

use serde::{Deserialize, Serialize};

/// One tick of fetch progress, keyed by the operation id the caller chose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub operation_id: String,
    #[serde(rename = "type")]
    pub kind: ProgressEventKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressEventKind {
    Progress,
    Status,
    Complete,
    Error,
}

impl ProgressEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressEventKind::Progress => "progress",
            ProgressEventKind::Status => "status",
            ProgressEventKind::Complete => "complete",
            ProgressEventKind::Error => "error",
        }
    }
}

impl ProgressEvent {
    pub fn progress(
        operation_id: impl Into<String>,
        percentage: u8,
        phase: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation_id: operation_id.into(),
            kind: ProgressEventKind::Progress,
            message: message.into(),
            percentage: Some(percentage.min(100)),
            phase: Some(phase.into()),
        }
    }

    pub fn status(operation_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            kind: ProgressEventKind::Status,
            message: message.into(),
            percentage: None,
            phase: None,
        }
    }

    pub fn complete(operation_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            kind: ProgressEventKind::Complete,
            message: message.into(),
            percentage: Some(100),
            phase: None,
        }
    }

    pub fn error(operation_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            kind: ProgressEventKind::Error,
            message: message.into(),
            percentage: None,
            phase: None,
        }
    }

    /// Terminal events end the stream; the channel is torn down shortly after.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            ProgressEventKind::Complete | ProgressEventKind::Error
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_detection() {
        assert!(ProgressEvent::complete("op", "done").is_terminal());
        assert!(ProgressEvent::error("op", "boom").is_terminal());
        assert!(!ProgressEvent::progress("op", 50, "receiving", "halfway").is_terminal());
        assert!(!ProgressEvent::status("op", "starting").is_terminal());
    }

    #[test]
    fn test_percentage_clamped() {
        let event = ProgressEvent::progress("op", 140, "receiving", "over");
        assert_eq!(event.percentage, Some(100));
    }

    #[test]
    fn test_wire_format_uses_type_field() {
        let event = ProgressEvent::progress("op-1", 42, "receiving", "Receiving objects");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["operation_id"], "op-1");
        assert_eq!(json["percentage"], 42);

        let json = serde_json::to_value(ProgressEvent::status("op-1", "ok")).unwrap();
        assert!(json.get("percentage").is_none());
        assert!(json.get("phase").is_none());
    }
}
