//! Per-message visibility lease renewal.

use crate::inflight::LeaseState;
use chrono::Duration;
use queue_client::{MessageId, QueueClient, QueueError, QueueName, ReceiptHandle};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "visibility_tests.rs"]
mod tests;

/// Spawns one independently cancellable renewal task per in-flight message,
/// keyed by nothing but its own handle so cancellation is O(1) and race-free
/// with the resolver.
pub struct VisibilityExtender;

impl VisibilityExtender {
    /// Spawn the renewal task for one in-flight message.
    ///
    /// The task renews the lease at half the visibility timeout, so it never
    /// expires while the handler runs. It stops when aborted by finalization,
    /// or on the first extension failure: a stale receipt marks the lease
    /// lost (the queue service already released the message), any other error
    /// leaves the message to redeliver naturally. Extension failures affect
    /// only this one message.
    pub fn spawn(
        client: Arc<dyn QueueClient>,
        queue: QueueName,
        message_id: MessageId,
        receipt: ReceiptHandle,
        visibility_timeout: Duration,
        lease: Arc<LeaseState>,
    ) -> JoinHandle<()> {
        let interval = visibility_timeout
            .to_std()
            .map(|d| d / 2)
            .unwrap_or(std::time::Duration::from_secs(15));

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;

                match client
                    .change_visibility(&queue, &receipt, visibility_timeout)
                    .await
                {
                    Ok(()) => {
                        debug!(
                            queue = %queue,
                            message_id = %message_id,
                            extension = ?visibility_timeout,
                            "extended visibility for in-flight message"
                        );
                    }
                    Err(QueueError::ReceiptInvalid { .. }) => {
                        // Already deleted or released elsewhere; the resolver
                        // must not act on this entry
                        lease.mark_lost();
                        debug!(
                            queue = %queue,
                            message_id = %message_id,
                            "lease lost, stopping visibility extension"
                        );
                        break;
                    }
                    Err(error) => {
                        warn!(
                            queue = %queue,
                            message_id = %message_id,
                            error = %error,
                            "visibility extension failed, message may be redelivered"
                        );
                        break;
                    }
                }
            }
        })
    }
}
