//! Outcome resolution: delete, retry, or dead-letter.
//!
//! Consumes one [`Outcome`] per message and performs exactly one terminal
//! action. Successful deletes are batched through a shared buffer to
//! amortize network calls; all adapter calls carry a bounded transient
//! retry before the failure is wrapped and reported.

use crate::config::{BackoffMode, RetryConfig};
use crate::error::{ErrorSink, ListenerExecutionFailed};
use crate::handler::Outcome;
use crate::inflight::InFlightEntry;
use crate::retry::{RetryPolicy, RetryState};
use chrono::Duration;
use queue_client::{QueueClient, QueueError, QueueName, ReceiptHandle, ReceivedMessage};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[cfg(test)]
#[path = "acknowledgement_tests.rs"]
mod tests;

// ============================================================================
// Transient retry around adapter calls
// ============================================================================

/// Run a queue operation with bounded retry on transient errors
async fn with_transient_retry<T, Fut, F>(
    policy: &RetryPolicy,
    operation: &'static str,
    queue: &QueueName,
    mut call: F,
) -> Result<T, QueueError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, QueueError>>,
{
    let mut state = RetryState::new();

    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && state.can_retry(policy) => {
                let delay = state.get_delay(policy);
                warn!(
                    queue = %queue,
                    operation,
                    error = %error,
                    attempt = state.total_attempts,
                    delay_ms = delay.as_millis(),
                    "transient queue operation failure, retrying"
                );
                tokio::time::sleep(delay).await;
                state.next_attempt();
            }
            Err(error) => return Err(error),
        }
    }
}

// ============================================================================
// Delete Buffer
// ============================================================================

/// Shared per-queue buffer of receipts ready for batched deletion.
///
/// Receipts are taken out atomically on drain, so no receipt can be
/// submitted for deletion twice.
pub struct DeleteBuffer {
    pending: Mutex<Vec<ReceiptHandle>>,
    flush_wanted: Notify,
    closed: AtomicBool,
    batch_size: usize,
}

impl DeleteBuffer {
    /// Create a buffer flushing eagerly at `batch_size` pending receipts
    pub fn new(batch_size: usize) -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(Vec::new()),
            flush_wanted: Notify::new(),
            closed: AtomicBool::new(false),
            batch_size,
        })
    }

    /// Number of receipts a single flush batch may carry
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Queue a receipt for deletion; wakes the flusher once the size
    /// threshold is reached
    pub async fn push(&self, receipt: ReceiptHandle) {
        let len = {
            let mut pending = self.pending.lock().await;
            pending.push(receipt);
            pending.len()
        };

        if len >= self.batch_size {
            self.flush_wanted.notify_one();
        }
    }

    /// Take up to `max` receipts out of the buffer
    pub async fn drain(&self, max: usize) -> Vec<ReceiptHandle> {
        let mut pending = self.pending.lock().await;
        if pending.len() <= max {
            std::mem::take(&mut *pending)
        } else {
            let rest = pending.split_off(max);
            std::mem::replace(&mut *pending, rest)
        }
    }

    /// Number of receipts currently pending
    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Whether the buffer is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Mark the buffer closed: no further pushes will arrive and the
    /// flusher should exit once drained
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.flush_wanted.notify_one();
    }

    /// Whether the buffer was closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Resolves when an eager flush is requested
    async fn flush_signal(&self) {
        self.flush_wanted.notified().await;
    }
}

/// Spawn the background task draining a queue's delete buffer.
///
/// Flushes every `interval`, or immediately when the buffer reaches its
/// size threshold; exits after a final flush once the buffer is closed.
pub fn spawn_delete_flusher(
    client: Arc<dyn QueueClient>,
    queue: QueueName,
    buffer: Arc<DeleteBuffer>,
    interval: std::time::Duration,
    operation_retry: RetryPolicy,
    error_sink: ErrorSink,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = buffer.flush_signal() => {}
            }

            flush_pending(&client, &queue, &buffer, &operation_retry, &error_sink).await;

            if buffer.is_closed() && buffer.is_empty().await {
                break;
            }
        }

        debug!(queue = %queue, "delete flusher stopped");
    })
}

/// Drain and delete everything currently buffered
async fn flush_pending(
    client: &Arc<dyn QueueClient>,
    queue: &QueueName,
    buffer: &Arc<DeleteBuffer>,
    operation_retry: &RetryPolicy,
    error_sink: &ErrorSink,
) {
    let max = buffer.batch_size().min(client.max_delete_batch_size());

    loop {
        let batch = buffer.drain(max).await;
        if batch.is_empty() {
            break;
        }

        let result = with_transient_retry(operation_retry, "delete_messages", queue, || {
            let client = Arc::clone(client);
            let queue = queue.clone();
            let batch = batch.clone();
            async move { client.delete_messages(&queue, &batch).await }
        })
        .await;

        match result {
            Ok(()) => {
                debug!(queue = %queue, count = batch.len(), "flushed batched deletes");
            }
            Err(error) => {
                // The messages keep their leases and redeliver once they
                // expire; processing of other messages is unaffected
                warn!(
                    queue = %queue,
                    count = batch.len(),
                    error = %error,
                    "batched delete failed, messages will redeliver"
                );
                error_sink.as_ref()(ListenerExecutionFailed::new(
                    format!("failed to delete {} processed messages from '{}'", batch.len(), queue),
                    anyhow::Error::new(error),
                ));
            }
        }
    }
}

// ============================================================================
// Acknowledgment Resolver
// ============================================================================

/// Maps handler outcomes to terminal queue operations for one queue
pub struct AckResolver {
    client: Arc<dyn QueueClient>,
    queue: QueueName,
    retry: RetryConfig,
    operation_retry: RetryPolicy,
    /// Delayed-retry visibility resets never exceed this
    visibility_cap: Duration,
    buffer: Arc<DeleteBuffer>,
    error_sink: ErrorSink,
}

impl AckResolver {
    /// Create a resolver for one queue
    pub fn new(
        client: Arc<dyn QueueClient>,
        queue: QueueName,
        retry: RetryConfig,
        operation_retry: RetryPolicy,
        visibility_cap: Duration,
        buffer: Arc<DeleteBuffer>,
        error_sink: ErrorSink,
    ) -> Self {
        Self {
            client,
            queue,
            retry,
            operation_retry,
            visibility_cap,
            buffer,
            error_sink,
        }
    }

    /// Consume an outcome and perform its exactly-one terminal action.
    ///
    /// Stops lease extension before anything else, so no extension call can
    /// race the terminal operation. Entries whose lease was lost get no
    /// action at all: the queue service already resolved them elsewhere.
    pub async fn resolve(&self, mut entry: InFlightEntry, outcome: Outcome) {
        entry.stop_extension();

        if entry.lease_lost() {
            debug!(
                queue = %self.queue,
                message_id = %entry.message().message_id,
                "skipping acknowledgment for lost lease"
            );
            return;
        }

        match outcome {
            Outcome::Success => {
                debug!(
                    queue = %self.queue,
                    message_id = %entry.message().message_id,
                    processing_ms = entry.processing_time().as_millis(),
                    "message processed, queueing delete"
                );
                self.buffer
                    .push(entry.message().receipt_handle.clone())
                    .await;
            }
            Outcome::Failure(cause) => {
                self.handle_failure(entry.message(), cause).await;
            }
            Outcome::Timeout => {
                let cause = Arc::new(anyhow::anyhow!(
                    "handler did not complete within its deadline"
                ));
                self.handle_failure(entry.message(), cause).await;
            }
        }
    }

    /// Route a failed message through the retry / dead-letter policy
    async fn handle_failure(&self, message: &ReceivedMessage, cause: Arc<anyhow::Error>) {
        let attempts = message.receive_count;

        if attempts < self.retry.max_attempts {
            self.release_for_retry(message, attempts, &cause).await;
            return;
        }

        // Attempts exhausted: this is a final failure either way
        self.error_sink.as_ref()(ListenerExecutionFailed::from_shared(
            format!(
                "handler for queue '{}' failed on final attempt {} of {}",
                self.queue, attempts, self.retry.max_attempts
            ),
            Arc::clone(&cause),
        ));

        match &self.retry.dead_letter_queue {
            Some(dead_letter_queue) => {
                self.dead_letter(message, dead_letter_queue).await;
            }
            None => {
                debug!(
                    queue = %self.queue,
                    message_id = %message.message_id,
                    attempts,
                    "attempts exhausted with no dead-letter target, leaving message to redeliver"
                );
            }
        }
    }

    /// Reset visibility so the message redelivers, immediately or after backoff
    async fn release_for_retry(
        &self,
        message: &ReceivedMessage,
        attempts: u32,
        cause: &Arc<anyhow::Error>,
    ) {
        let delay = match &self.retry.backoff {
            BackoffMode::Immediate => Duration::zero(),
            BackoffMode::Delayed(policy) => {
                let delay = policy.calculate_delay(attempts.saturating_sub(1));
                Duration::from_std(delay)
                    .unwrap_or(self.visibility_cap)
                    .min(self.visibility_cap)
            }
        };

        debug!(
            queue = %self.queue,
            message_id = %message.message_id,
            attempt = attempts,
            max_attempts = self.retry.max_attempts,
            delay_ms = delay.num_milliseconds(),
            error = %cause,
            "releasing failed message for retry"
        );

        let receipt = message.receipt_handle.clone();
        let result =
            with_transient_retry(&self.operation_retry, "change_visibility", &self.queue, || {
                let client = Arc::clone(&self.client);
                let queue = self.queue.clone();
                let receipt = receipt.clone();
                async move { client.change_visibility(&queue, &receipt, delay).await }
            })
            .await;

        if let Err(error) = result {
            self.report_operation_failure(
                format!(
                    "failed to release message '{}' for retry on queue '{}'",
                    message.message_id, self.queue
                ),
                error,
            );
        }
    }

    /// Move an exhausted message to the dead-letter queue: send first,
    /// delete from the source queue only after the send is confirmed
    async fn dead_letter(&self, message: &ReceivedMessage, dead_letter_queue: &QueueName) {
        let forwarded = message.message();
        let send_result =
            with_transient_retry(&self.operation_retry, "send_message", dead_letter_queue, || {
                let client = Arc::clone(&self.client);
                let target = dead_letter_queue.clone();
                let forwarded = forwarded.clone();
                async move { client.send_message(&target, forwarded).await }
            })
            .await;

        match send_result {
            Ok(_) => {
                info!(
                    queue = %self.queue,
                    dead_letter_queue = %dead_letter_queue,
                    message_id = %message.message_id,
                    attempts = message.receive_count,
                    "message dead-lettered"
                );

                let receipt = message.receipt_handle.clone();
                let delete_result = with_transient_retry(
                    &self.operation_retry,
                    "delete_message",
                    &self.queue,
                    || {
                        let client = Arc::clone(&self.client);
                        let queue = self.queue.clone();
                        let receipt = receipt.clone();
                        async move { client.delete_message(&queue, &receipt).await }
                    },
                )
                .await;

                if let Err(error) = delete_result {
                    self.report_operation_failure(
                        format!(
                            "failed to delete dead-lettered message '{}' from queue '{}'",
                            message.message_id, self.queue
                        ),
                        error,
                    );
                }
            }
            Err(error) => {
                self.report_operation_failure(
                    format!(
                        "failed to dead-letter message '{}' to queue '{}'",
                        message.message_id, dead_letter_queue
                    ),
                    error,
                );
            }
        }
    }

    /// Wrap an exhausted adapter failure and hand it to the error sink
    fn report_operation_failure(&self, message: String, error: QueueError) {
        warn!(queue = %self.queue, error = %error, "{message}");
        self.error_sink.as_ref()(ListenerExecutionFailed::new(
            message,
            anyhow::Error::new(error),
        ));
    }
}
