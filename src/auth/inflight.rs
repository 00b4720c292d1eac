//! Coordination with unrelated, in-progress authorization exchanges.
//!
//! An interactive sign-in flow writes the store when it completes; token
//! reads issued mid-exchange would observe a store about to be replaced. The
//! broker therefore awaits an [`InflightWaiter`] before reading. The default
//! [`NoopWaiter`] resolves immediately; wire an [`ExchangeGate`] into both
//! the broker and the sign-in flow to get the coordination.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;

/// Suspends callers until any inflight authorization exchange completes.
#[async_trait]
pub trait InflightWaiter: Send + Sync {
    /// Resolve immediately when nothing is inflight, otherwise once the
    /// exchange completes.
    async fn wait(&self);
}

/// Blanket impl for `Arc<T>`.
#[async_trait]
impl<T: InflightWaiter + ?Sized> InflightWaiter for Arc<T> {
    async fn wait(&self) {
        (**self).wait().await
    }
}

/// Waiter that never suspends. The default when no exchange flow exists.
pub struct NoopWaiter;

#[async_trait]
impl InflightWaiter for NoopWaiter {
    async fn wait(&self) {}
}

/// Tracks inflight exchanges and gates readers on their completion.
///
/// An exchange flow calls [`ExchangeGate::begin`] and holds the returned
/// guard for the duration of the exchange; [`InflightWaiter::wait`] resolves
/// once no guards remain.
#[derive(Clone)]
pub struct ExchangeGate {
    inflight: Arc<watch::Sender<usize>>,
}

impl ExchangeGate {
    /// Create a gate with nothing inflight.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0usize);
        Self {
            inflight: Arc::new(tx),
        }
    }

    /// Mark an exchange as inflight until the returned guard drops.
    pub fn begin(&self) -> ExchangeGuard {
        self.inflight.send_modify(|n| *n += 1);
        ExchangeGuard {
            inflight: Arc::clone(&self.inflight),
        }
    }
}

impl Default for ExchangeGate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InflightWaiter for ExchangeGate {
    async fn wait(&self) {
        let mut rx = self.inflight.subscribe();
        // The sender lives inside self, so wait_for cannot observe a closed
        // channel here.
        let _ = rx.wait_for(|inflight| *inflight == 0).await;
    }
}

/// Marks one inflight exchange; dropping it releases waiting readers.
pub struct ExchangeGuard {
    inflight: Arc<watch::Sender<usize>>,
}

impl Drop for ExchangeGuard {
    fn drop(&mut self) {
        self.inflight.send_modify(|n| *n = n.saturating_sub(1));
    }
}
