//! Service Module
//!
//! Business logic layer for the orchestrator.
//! The run service handles submission and the read path; the pipeline
//! service drives the background step state machine; the progress
//! service owns the per-operation fetch progress channels.

pub mod pipeline;
pub mod progress;
pub mod run;
pub mod steps;

// Re-export for convenience
pub use pipeline as pipeline_service;
pub use run as run_service;
