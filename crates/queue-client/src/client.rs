//! Client trait implemented by queue providers.

use crate::error::QueueError;
use crate::message::{Message, MessageId, QueueName, ReceiptHandle, ReceiveRequest, ReceivedMessage};
use async_trait::async_trait;
use chrono::Duration;
use std::collections::HashMap;

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Main interface for queue operations across all providers.
///
/// The listener container treats this as a capability: all network calls to
/// the remote queue service go through it, and implementations carry their
/// own connection handling. The [`InMemoryQueueClient`](crate::providers::InMemoryQueueClient)
/// is a full reference implementation.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Receive up to `request.max_messages` messages, long-polling up to
    /// `request.wait_time`. Returns an empty vector when no message becomes
    /// available within the wait.
    async fn receive_messages(
        &self,
        queue: &QueueName,
        request: &ReceiveRequest,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Delete a single received message
    async fn delete_message(
        &self,
        queue: &QueueName,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError>;

    /// Delete multiple received messages in one call.
    ///
    /// The batch must not exceed [`max_delete_batch_size`](Self::max_delete_batch_size).
    async fn delete_messages(
        &self,
        queue: &QueueName,
        receipts: &[ReceiptHandle],
    ) -> Result<(), QueueError>;

    /// Change the visibility timeout of a received message.
    ///
    /// A zero timeout makes the message immediately available again.
    async fn change_visibility(
        &self,
        queue: &QueueName,
        receipt: &ReceiptHandle,
        timeout: Duration,
    ) -> Result<(), QueueError>;

    /// Send a message to a queue (used for dead-lettering)
    async fn send_message(
        &self,
        queue: &QueueName,
        message: Message,
    ) -> Result<MessageId, QueueError>;

    /// Check whether a queue exists
    async fn queue_exists(&self, queue: &QueueName) -> Result<bool, QueueError>;

    /// Create a queue (idempotent)
    async fn create_queue(&self, queue: &QueueName) -> Result<(), QueueError>;

    /// Fetch the named queue attributes
    async fn queue_attributes(
        &self,
        queue: &QueueName,
        names: &[String],
    ) -> Result<HashMap<String, String>, QueueError>;

    /// Maximum number of receipts accepted by a single batch delete
    fn max_delete_batch_size(&self) -> usize;
}
