//! Per-queue polling loop feeding the processing pipeline.

use crate::acknowledgement::{AckResolver, DeleteBuffer};
use crate::config::{to_std, ListenerConfig, QueueNotFoundStrategy};
use crate::dispatcher::{ConcurrencyLimiter, ConcurrencyPermit};
use crate::error::{ErrorSink, ListenerExecutionFailed};
use crate::handler::Handler;
use crate::inflight::{InFlightEntry, InFlightTracker, LeaseState};
use crate::invoker::HandlerInvoker;
use crate::retry::RetryState;
use crate::visibility::VisibilityExtender;
use queue_client::{
    QueueClient, QueueError, QueueName, ReceiveRequest, ReceivedMessage,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

#[cfg(test)]
#[path = "source_tests.rs"]
mod tests;

/// One queue's message source and dispatch pipeline.
///
/// Long-polls the queue, admits messages through the concurrency limiter,
/// and spawns one processing task per admitted unit (message or batch).
/// Transient receive errors are retried with backoff up to the configured
/// budget; exhausting the budget stops only this queue's polling.
pub struct QueueWorker {
    pub(crate) queue: QueueName,
    pub(crate) config: ListenerConfig,
    pub(crate) client: Arc<dyn QueueClient>,
    pub(crate) invoker: HandlerInvoker,
    pub(crate) limiter: ConcurrencyLimiter,
    pub(crate) resolver: Arc<AckResolver>,
    pub(crate) buffer: Arc<DeleteBuffer>,
    pub(crate) tracker: Arc<InFlightTracker>,
    pub(crate) queue_attributes: HashMap<String, String>,
    pub(crate) shutdown: watch::Receiver<bool>,
    pub(crate) error_sink: ErrorSink,
}

impl QueueWorker {
    /// Run the polling loop until shutdown or source failure, then drain
    pub async fn run(mut self) {
        info!(queue = %self.queue, "queue worker started");

        let mut tasks = JoinSet::new();
        // A batch handler's whole poll must fit through admission as a
        // unit, so never pull more than the limiter can grant at once
        let poll_size = match self.invoker.handler() {
            Handler::Batch(_) => self.config.batch_size.min(self.limiter.max_batch() as u32),
            Handler::Single(_) => self.config.batch_size,
        };
        let request = ReceiveRequest::new()
            .with_max_messages(poll_size)
            .with_wait_time(self.config.poll_wait)
            .with_visibility_timeout(self.config.visibility_timeout)
            .with_attribute_names(self.config.message_attribute_names.clone());
        let mut source_retry = RetryState::new();

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            // Reap finished processing tasks without blocking the poll
            while tasks.try_join_next().is_some() {}

            let received = tokio::select! {
                _ = self.shutdown.changed() => break,
                result = self.client.receive_messages(&self.queue, &request) => result,
            };

            match received {
                Ok(batch) => {
                    source_retry = RetryState::new();
                    if batch.is_empty() {
                        continue;
                    }

                    debug!(queue = %self.queue, count = batch.len(), "received messages");
                    if !self.dispatch(batch, &mut tasks).await {
                        break;
                    }
                }
                Err(QueueError::QueueNotFound { .. }) => {
                    if !self.handle_queue_not_found().await {
                        break;
                    }
                }
                Err(error) if error.is_transient() && source_retry.can_retry(&self.config.source_retry) => {
                    let delay = source_retry.get_delay(&self.config.source_retry);
                    warn!(
                        queue = %self.queue,
                        error = %error,
                        attempt = source_retry.total_attempts,
                        delay_ms = delay.as_millis(),
                        "transient receive failure, backing off"
                    );
                    source_retry.next_attempt();

                    tokio::select! {
                        _ = self.shutdown.changed() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(error) => {
                    error!(
                        queue = %self.queue,
                        error = %error,
                        "unrecoverable receive failure, stopping queue polling"
                    );
                    self.error_sink.as_ref()(ListenerExecutionFailed::new(
                        format!("message source for queue '{}' failed", self.queue),
                        anyhow::Error::new(error),
                    ));
                    break;
                }
            }
        }

        let queue = self.queue.clone();
        self.drain(tasks).await;
        info!(queue = %queue, "queue worker stopped");
    }

    /// Apply the queue-not-found strategy mid-run; returns false to stop polling
    async fn handle_queue_not_found(&mut self) -> bool {
        match self.config.queue_not_found_strategy {
            QueueNotFoundStrategy::Fail => {
                error!(queue = %self.queue, "queue not found, stopping queue polling");
                self.error_sink.as_ref()(ListenerExecutionFailed::new(
                    format!("queue '{}' not found", self.queue),
                    anyhow::anyhow!("queue not found with Fail strategy"),
                ));
                false
            }
            QueueNotFoundStrategy::Create => {
                info!(queue = %self.queue, "queue not found, attempting to create");
                if let Err(error) = self.client.create_queue(&self.queue).await {
                    warn!(queue = %self.queue, error = %error, "queue creation failed");
                }
                true
            }
            QueueNotFoundStrategy::Ignore => {
                warn!(queue = %self.queue, "queue not found, skipping polling cycle");
                let pause = to_std(self.config.poll_wait);
                tokio::select! {
                    _ = self.shutdown.changed() => {}
                    _ = tokio::time::sleep(pause) => {}
                }
                true
            }
        }
    }

    /// Admit a polled batch through the concurrency limiter and spawn its
    /// processing; returns false if shutdown interrupted admission
    async fn dispatch(
        &mut self,
        batch: Vec<ReceivedMessage>,
        tasks: &mut JoinSet<()>,
    ) -> bool {
        match self.invoker.handler() {
            Handler::Single(_) => {
                for message in batch {
                    let Some(entry) = self.admit(message).await else {
                        return false;
                    };

                    let invoker = self.invoker.clone();
                    let resolver = Arc::clone(&self.resolver);
                    tasks.spawn(async move {
                        let outcome = invoker.invoke_single(entry.message()).await;
                        resolver.resolve(entry, outcome).await;
                    });
                }
            }
            Handler::Batch(_) => {
                // The batch goes to the handler as a unit, with each message
                // occupying one concurrency slot. All slots for a batch are
                // granted together; admitting them one at a time could park
                // the worker on a slot that only its own unspawned batch
                // task would ever free. Polls wider than the admission cap
                // are split so every slice's request stays satisfiable.
                let cap = self.limiter.max_batch();
                let mut remaining = batch;
                while !remaining.is_empty() {
                    let chunk = if remaining.len() > cap {
                        let tail = remaining.split_off(cap);
                        std::mem::replace(&mut remaining, tail)
                    } else {
                        std::mem::take(&mut remaining)
                    };

                    let granted = tokio::select! {
                        _ = self.shutdown.changed() => return false,
                        permits = self.limiter.acquire_many(chunk.len()) => permits,
                    };
                    let Some(permits) = granted else {
                        return false;
                    };

                    let entries: Vec<InFlightEntry> = chunk
                        .into_iter()
                        .zip(permits)
                        .map(|(message, permit)| self.wrap(message, permit))
                        .collect();

                    let invoker = self.invoker.clone();
                    let resolver = Arc::clone(&self.resolver);
                    tasks.spawn(async move {
                        let messages: Vec<ReceivedMessage> =
                            entries.iter().map(|e| e.message().clone()).collect();
                        let outcomes = invoker.invoke_batch(&messages).await;
                        for (entry, outcome) in entries.into_iter().zip(outcomes) {
                            resolver.resolve(entry, outcome).await;
                        }
                    });
                }
            }
        }

        true
    }

    /// Wait for a concurrency slot, then wrap the message as an in-flight
    /// entry
    async fn admit(&mut self, message: ReceivedMessage) -> Option<InFlightEntry> {
        let permit = tokio::select! {
            _ = self.shutdown.changed() => return None,
            permit = self.limiter.acquire() => permit?,
        };

        Some(self.wrap(message, permit))
    }

    /// Turn an admitted message into an in-flight entry with its lease
    /// extender attached
    fn wrap(&self, mut message: ReceivedMessage, permit: ConcurrencyPermit) -> InFlightEntry {
        // Attach the queue attributes fetched at start
        for (name, value) in &self.queue_attributes {
            message
                .attributes
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }

        let lease = Arc::new(LeaseState::new());
        let extender = VisibilityExtender::spawn(
            Arc::clone(&self.client),
            self.queue.clone(),
            message.message_id.clone(),
            message.receipt_handle.clone(),
            self.config.visibility_timeout,
            Arc::clone(&lease),
        );
        let guard = self.tracker.track();

        InFlightEntry::new(message, lease, extender, permit, guard)
    }

    /// Let in-flight processing finish within the shutdown window, then
    /// abandon whatever remains (leases are left to expire), and close the
    /// delete buffer so the flusher can make its final flush and exit
    async fn drain(self, mut tasks: JoinSet<()>) {
        let window = to_std(self.config.shutdown_timeout);
        let drained = tokio::time::timeout(window, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                queue = %self.queue,
                abandoned = tasks.len(),
                "shutdown window elapsed, abandoning remaining in-flight messages"
            );
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        self.buffer.close();
    }
}
