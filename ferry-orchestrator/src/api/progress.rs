//! Progress API Handlers
//!
//! Server-sent-events stream of fetch progress plus the cancellation
//! control path. Any number of connections may subscribe to the same
//! operation id; each stream terminates after the complete/error event.

use std::convert::Infallible;

use axum::{
    Json,
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use ferry_core::domain::progress::ProgressEvent;
use ferry_core::dto::CancelResponse;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::{Stream, wrappers::ReceiverStream};

use crate::api::error::{ApiError, ApiResult};
use crate::service::run_service;
use crate::state::AppState;

/// GET /api/progress/{operation_id}
/// Long-lived SSE stream of ProgressEvents for an in-flight fetch
pub async fn subscribe(
    State(state): State<AppState>,
    Path(operation_id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    tracing::debug!("New progress subscriber for operation {}", operation_id);

    let receiver = state
        .progress
        .subscribe(&operation_id)
        .ok_or_else(|| ApiError::NotFound(format!("No active operation {}", operation_id)))?;

    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(32);
    tokio::spawn(pump_events(receiver, tx));

    Ok(Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default()))
}

/// POST /api/progress/{operation_id}/cancel
/// Request termination of the in-flight fetch process
pub async fn cancel(
    State(state): State<AppState>,
    Path(operation_id): Path<String>,
) -> Json<CancelResponse> {
    tracing::info!("Cancel requested for operation {}", operation_id);

    let cancelled = run_service::cancel_fetch(&state.progress, &operation_id);

    Json(CancelResponse { cancelled })
}

/// Forwards broadcast events into the SSE channel until a terminal event
/// arrives, the channel closes, or the subscriber disconnects. A lagging
/// subscriber skips the dropped events and keeps following.
async fn pump_events(
    mut receiver: broadcast::Receiver<ProgressEvent>,
    tx: mpsc::Sender<Result<Event, Infallible>>,
) {
    loop {
        match receiver.recv().await {
            Ok(event) => {
                let terminal = event.is_terminal();
                let sse_event = match Event::default()
                    .event(event.kind.as_str())
                    .json_data(&event)
                {
                    Ok(e) => e,
                    Err(err) => {
                        tracing::error!("Failed to encode progress event: {}", err);
                        continue;
                    }
                };
                if tx.send(Ok(sse_event)).await.is_err() {
                    // Subscriber went away; the producer and other
                    // subscribers are unaffected.
                    break;
                }
                if terminal {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("Progress subscriber lagged, skipped {} events", skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
