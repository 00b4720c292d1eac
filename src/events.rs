//! Lifecycle event publication.
//!
//! Refresh outcomes are announced through an [`EventSink`]; the broker never
//! waits on consumers. [`EventBus`] is the shipped implementation, backed by
//! a `tokio::sync::broadcast` channel so any number of observers can
//! subscribe without touching shared state.

use tokio::sync::broadcast;

use crate::config::EVENT_CHANNEL_CAPACITY;

/// Events published by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A refresh exchange succeeded and the new pair was persisted.
    TokenRefreshed,
    /// A refresh exchange failed with a fatal classification.
    TokenRefreshFailed {
        /// Description of the failure.
        error: String,
    },
}

/// Fire-and-forget event publication.
///
/// `publish` must never block or fail; a sink with no listeners simply drops
/// the event.
pub trait EventSink: Send + Sync {
    /// Publish a lifecycle event.
    fn publish(&self, event: SessionEvent);
}

/// Blanket impl for `Arc<T>`.
impl<T: EventSink + ?Sized> EventSink for std::sync::Arc<T> {
    fn publish(&self, event: SessionEvent) {
        (**self).publish(event)
    }
}

/// Broadcast-backed event bus.
///
/// Cloning shares the underlying channel. Subscribers that fall behind lose
/// the oldest events rather than applying backpressure to the broker.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Create a bus with the default channel capacity.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: SessionEvent) {
        // No receivers is fine; the event is simply dropped.
        let _ = self.tx.send(event);
    }
}
