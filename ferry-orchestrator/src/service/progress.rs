//! Progress channel registry
//!
//! One in-memory publish/subscribe channel per fetch operation, keyed by
//! the operation id the caller chose. The registry is owned by the
//! service instance with register/subscribe/publish/cancel/remove
//! operations; channels have bounded lifetime and are torn down exactly
//! once, shortly after their terminal event.
//!
//! Events are broadcast to every live subscriber. There is no backlog
//! replay: a subscriber only sees events published after it subscribed,
//! and events published with no subscriber at all are dropped, never
//! queued.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ferry_core::domain::progress::ProgressEvent;
use ferry_git::CancelToken;
use tokio::sync::broadcast;
use tracing::{debug, info};

const CHANNEL_CAPACITY: usize = 256;

/// Delay between a terminal event and channel teardown, giving slow
/// subscribers time to drain the final event.
const TEARDOWN_GRACE: Duration = Duration::from_millis(500);

struct OperationChannel {
    sender: broadcast::Sender<ProgressEvent>,
    cancel: CancelToken,
}

/// Registry of live fetch-progress channels
#[derive(Clone)]
pub struct ProgressRegistry {
    inner: Arc<Mutex<HashMap<String, OperationChannel>>>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Opens a channel for an operation, returning the kill switch the
    /// producer must watch. Re-registering an id replaces the old
    /// channel.
    pub fn register(&self, operation_id: &str) -> CancelToken {
        let (sender, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        let cancel = CancelToken::new();
        let mut channels = self.inner.lock().unwrap();
        channels.insert(
            operation_id.to_string(),
            OperationChannel {
                sender,
                cancel: cancel.clone(),
            },
        );
        debug!("registered progress channel for operation {}", operation_id);
        cancel
    }

    /// Subscribes to an operation's events. Any number of concurrent
    /// subscribers is supported; each gets every event published after
    /// this call. Returns None when no channel is live for the id.
    pub fn subscribe(&self, operation_id: &str) -> Option<broadcast::Receiver<ProgressEvent>> {
        let channels = self.inner.lock().unwrap();
        channels.get(operation_id).map(|c| c.sender.subscribe())
    }

    /// Publishes an event to all live subscribers. Dropped silently when
    /// the channel is gone or nobody is listening.
    pub fn publish(&self, operation_id: &str, event: ProgressEvent) {
        let channels = self.inner.lock().unwrap();
        if let Some(channel) = channels.get(operation_id) {
            let _ = channel.sender.send(event);
        }
    }

    /// Publishes a terminal event, then tears the channel down after a
    /// short grace delay so the final event can flush to subscribers.
    pub fn finish(&self, operation_id: &str, event: ProgressEvent) {
        self.publish(operation_id, event);

        let registry = self.clone();
        let operation_id = operation_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(TEARDOWN_GRACE).await;
            registry.remove(&operation_id);
        });
    }

    /// The kill switch handed out at registration, for the producer task.
    pub fn cancel_token(&self, operation_id: &str) -> Option<CancelToken> {
        let channels = self.inner.lock().unwrap();
        channels.get(operation_id).map(|c| c.cancel.clone())
    }

    /// Fires the operation's kill switch. The producer kills the external
    /// process, surfaces the error event to subscribers, and tears the
    /// channel down. Returns false when no such operation is live.
    pub fn cancel(&self, operation_id: &str) -> bool {
        let channels = self.inner.lock().unwrap();
        match channels.get(operation_id) {
            Some(channel) => {
                info!("cancellation requested for operation {}", operation_id);
                channel.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Detaches all subscribers and releases the channel.
    pub fn remove(&self, operation_id: &str) {
        let mut channels = self.inner.lock().unwrap();
        if channels.remove(operation_id).is_some() {
            debug!("removed progress channel for operation {}", operation_id);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProgressRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_fan_out_to_all_subscribers() {
        let registry = ProgressRegistry::new();
        registry.register("op-1");

        let mut first = registry.subscribe("op-1").unwrap();
        let mut second = registry.subscribe("op-1").unwrap();

        registry.publish("op-1", ProgressEvent::progress("op-1", 40, "receiving", "tick"));

        let a = first.recv().await.unwrap();
        let b = second.recv().await.unwrap();
        assert_eq!(a.percentage, Some(40));
        assert_eq!(b.percentage, Some(40));
    }

    #[tokio::test]
    async fn test_no_backlog_replay_for_late_subscribers() {
        let registry = ProgressRegistry::new();
        registry.register("op-1");

        registry.publish("op-1", ProgressEvent::progress("op-1", 10, "counting", "early"));

        let mut late = registry.subscribe("op-1").unwrap();
        registry.publish("op-1", ProgressEvent::progress("op-1", 50, "receiving", "later"));

        let event = late.recv().await.unwrap();
        assert_eq!(event.percentage, Some(50));
        assert!(late.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_without_channel_is_dropped() {
        let registry = ProgressRegistry::new();
        // No channel registered; nothing to assert beyond "does not panic".
        registry.publish("ghost", ProgressEvent::status("ghost", "ignored"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_subscriber_disconnect_does_not_affect_others() {
        let registry = ProgressRegistry::new();
        registry.register("op-1");

        let first = registry.subscribe("op-1").unwrap();
        let mut second = registry.subscribe("op-1").unwrap();
        drop(first);

        registry.publish("op-1", ProgressEvent::status("op-1", "still here"));
        let event = second.recv().await.unwrap();
        assert_eq!(event.message, "still here");
    }

    #[tokio::test]
    async fn test_cancel_fires_token_and_reports_liveness() {
        let registry = ProgressRegistry::new();
        let token = registry.register("op-1");

        assert!(!token.is_cancelled());
        assert!(registry.cancel("op-1"));
        assert!(token.is_cancelled());

        assert!(!registry.cancel("unknown-op"));
    }

    #[tokio::test]
    async fn test_finish_tears_down_after_grace() {
        let registry = ProgressRegistry::new();
        registry.register("op-1");
        let mut rx = registry.subscribe("op-1").unwrap();

        registry.finish("op-1", ProgressEvent::complete("op-1", "done"));

        // The terminal event is still delivered.
        let event = rx.recv().await.unwrap();
        assert!(event.is_terminal());

        tokio::time::sleep(TEARDOWN_GRACE * 2).await;
        assert!(registry.subscribe("op-1").is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_reregister_replaces_channel() {
        let registry = ProgressRegistry::new();
        let old_token = registry.register("op-1");
        let new_token = registry.register("op-1");

        registry.cancel("op-1");
        assert!(new_token.is_cancelled());
        assert!(!old_token.is_cancelled());
        assert_eq!(registry.len(), 1);
    }
}
