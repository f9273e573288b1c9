//! Ferry Git
//!
//! Local git plumbing for the migration pipeline:
//! - Argument-array subprocess invocation of the git executable with
//!   captured output, timeouts, and cooperative cancellation
//! - Input sanitizers for values that reach a git argv array
//! - Clone progress stream parsing
//! - The conflict-resolving push synchronizer
//! - The override-on-conflict recursive file copier

pub mod copy;
pub mod error;
pub mod process;
pub mod progress;
pub mod sanitize;
pub mod sync;

pub use error::GitError;
pub use process::{CancelToken, GitOutput, GitRunner};
pub use sync::{GitSync, PushOutcome};
