//! Shared service state
//!
//! Handed to every request handler and cloned into each background
//! pipeline task. The progress registry is owned here rather than being
//! process-wide static state.

use sqlx::PgPool;

use crate::service::progress::ProgressRegistry;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub progress: ProgressRegistry,
}
