//! Bookkeeping for messages currently being processed.

use crate::dispatcher::ConcurrencyPermit;
use queue_client::ReceivedMessage;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

#[cfg(test)]
#[path = "inflight_tests.rs"]
mod tests;

/// Shared lease status between the visibility extender and the resolver.
///
/// Marked lost when an extension call discovers the receipt is stale (the
/// queue service already released the message elsewhere); the resolver must
/// take no terminal action on a lost lease.
#[derive(Debug, Default)]
pub struct LeaseState {
    lost: AtomicBool,
}

impl LeaseState {
    /// Create a fresh, held lease
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the lease was lost
    pub fn mark_lost(&self) {
        self.lost.store(true, Ordering::SeqCst);
    }

    /// Check whether the lease was lost
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }
}

/// A message admitted into processing, together with its lease-extension
/// task, concurrency permits, and processing start time.
///
/// Created when a message passes the dispatcher's admission gate; destroyed
/// when the resolver finalizes the message. Dropping the entry aborts the
/// extender task, so no extension call can follow a terminal action.
pub struct InFlightEntry {
    message: ReceivedMessage,
    started_at: Instant,
    lease: Arc<LeaseState>,
    extender: Option<JoinHandle<()>>,
    _permit: ConcurrencyPermit,
    _guard: TrackerGuard,
}

impl InFlightEntry {
    /// Wrap an admitted message
    pub fn new(
        message: ReceivedMessage,
        lease: Arc<LeaseState>,
        extender: JoinHandle<()>,
        permit: ConcurrencyPermit,
        guard: TrackerGuard,
    ) -> Self {
        Self {
            message,
            started_at: Instant::now(),
            lease,
            extender: Some(extender),
            _permit: permit,
            _guard: guard,
        }
    }

    /// The wrapped message
    pub fn message(&self) -> &ReceivedMessage {
        &self.message
    }

    /// Time spent processing so far
    pub fn processing_time(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Whether the lease was lost while processing
    pub fn lease_lost(&self) -> bool {
        self.lease.is_lost()
    }

    /// Stop lease extension; idempotent
    pub fn stop_extension(&mut self) {
        if let Some(extender) = self.extender.take() {
            extender.abort();
        }
    }
}

impl Drop for InFlightEntry {
    fn drop(&mut self) {
        self.stop_extension();
    }
}

/// Counts in-flight messages across all queues for observability
#[derive(Debug, Default)]
pub struct InFlightTracker {
    count: AtomicUsize,
}

impl InFlightTracker {
    /// Create an idle tracker
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register one in-flight message; the returned guard releases it on drop
    pub fn track(self: &Arc<Self>) -> TrackerGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        TrackerGuard {
            tracker: Arc::clone(self),
        }
    }

    /// Current in-flight count
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

/// Guard decrementing the tracker count when a message finalizes
pub struct TrackerGuard {
    tracker: Arc<InFlightTracker>,
}

impl Drop for TrackerGuard {
    fn drop(&mut self) {
        self.tracker.count.fetch_sub(1, Ordering::SeqCst);
    }
}
