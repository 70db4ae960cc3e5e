//! Concurrency-limited admission of messages into processing.
//!
//! This is the backpressure mechanism: the message source cannot pull more
//! messages than can be admitted, because unacknowledged pulled messages
//! count against the queue service's visibility budget.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;

/// Process-wide concurrency cap shared by every queue's limiter.
///
/// Carries its capacity alongside the semaphore so limiters can size
/// atomic multi-slot requests that are guaranteed satisfiable.
#[derive(Debug)]
pub struct SharedSlots {
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl SharedSlots {
    /// Create a shared cap with the given capacity
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        })
    }

    /// Currently free shared slots
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }
}

/// Bounds concurrent processing per queue, and optionally process-wide.
///
/// The shared cap, when present, is common to every queue's limiter and
/// passed in explicitly; effective capacity is the minimum of the two
/// limits.
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    queue_slots: Arc<Semaphore>,
    queue_capacity: usize,
    shared: Option<Arc<SharedSlots>>,
}

impl ConcurrencyLimiter {
    /// Create a limiter with a per-queue capacity and an optional shared
    /// process-wide cap
    pub fn new(max_concurrent: usize, shared: Option<Arc<SharedSlots>>) -> Self {
        Self {
            queue_slots: Arc::new(Semaphore::new(max_concurrent)),
            queue_capacity: max_concurrent,
            shared,
        }
    }

    /// Acquire one processing slot, suspending until capacity frees.
    ///
    /// Returns `None` only if a semaphore was closed, which the listener
    /// never does during normal operation.
    pub async fn acquire(&self) -> Option<ConcurrencyPermit> {
        let queue = Arc::clone(&self.queue_slots).acquire_owned().await.ok()?;

        let shared = match &self.shared {
            Some(shared) => Some(Arc::clone(&shared.slots).acquire_owned().await.ok()?),
            None => None,
        };

        Some(ConcurrencyPermit {
            _queue: queue,
            _shared: shared,
        })
    }

    /// Acquire `count` slots as a unit, suspending until all are granted.
    ///
    /// Permits are assigned to waiters in arrival order, so a waiting
    /// request is satisfied as soon as enough running messages finish and
    /// cannot interleave with another limiter into a stuck state. `count`
    /// must not exceed [`max_batch`](Self::max_batch) or the request can
    /// never be satisfied.
    pub async fn acquire_many(&self, count: usize) -> Option<Vec<ConcurrencyPermit>> {
        debug_assert!(count <= self.max_batch());

        let mut queue = Arc::clone(&self.queue_slots)
            .acquire_many_owned(count as u32)
            .await
            .ok()?;
        let mut shared = match &self.shared {
            Some(shared) => Some(
                Arc::clone(&shared.slots)
                    .acquire_many_owned(count as u32)
                    .await
                    .ok()?,
            ),
            None => None,
        };

        let mut permits = Vec::with_capacity(count);
        for _ in 0..count {
            let queue_slot = queue.split(1)?;
            let shared_slot = match shared.as_mut() {
                Some(bundle) => Some(bundle.split(1)?),
                None => None,
            };
            permits.push(ConcurrencyPermit {
                _queue: queue_slot,
                _shared: shared_slot,
            });
        }

        Some(permits)
    }

    /// Largest slot count an `acquire_many` call is guaranteed to satisfy
    /// once capacity frees
    pub fn max_batch(&self) -> usize {
        match &self.shared {
            Some(shared) => self.queue_capacity.min(shared.capacity),
            None => self.queue_capacity,
        }
    }

    /// Currently free per-queue slots
    pub fn available(&self) -> usize {
        self.queue_slots.available_permits()
    }
}

/// Held while a message is in flight; dropping it frees the slot(s)
pub struct ConcurrencyPermit {
    _queue: OwnedSemaphorePermit,
    _shared: Option<OwnedSemaphorePermit>,
}
