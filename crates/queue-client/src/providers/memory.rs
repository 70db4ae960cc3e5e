//! In-memory queue provider implementation for testing and development.
//!
//! This module provides a fully functional in-memory queue implementation that:
//! - Implements visibility timeouts with automatic redelivery
//! - Tracks receive counts and receive timestamps per message
//! - Invalidates receipt handles once a delivery is released
//! - Provides thread-safe concurrent access
//!
//! This provider is intended for:
//! - Unit testing of listener-container consumers
//! - Development and prototyping
//! - Reference implementation for cloud providers

use crate::client::QueueClient;
use crate::error::QueueError;
use crate::message::{
    AttributeSet, Message, MessageId, QueueName, ReceiptHandle, ReceiveRequest, ReceivedMessage,
    Timestamp,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// Poll granularity used to emulate long-poll receives
const LONG_POLL_TICK_MS: u64 = 10;

/// Maximum receipts accepted by one batch delete, matching the common
/// queue-service limit
const MAX_DELETE_BATCH_SIZE: usize = 10;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Thread-safe storage for all queues
struct QueueStorage {
    queues: HashMap<QueueName, InMemoryQueue>,
}

impl QueueStorage {
    fn new() -> Self {
        Self {
            queues: HashMap::new(),
        }
    }

    fn queue_mut(&mut self, queue_name: &QueueName) -> Result<&mut InMemoryQueue, QueueError> {
        self.queues
            .get_mut(queue_name)
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: queue_name.to_string(),
            })
    }
}

/// Internal queue state for a single queue
struct InMemoryQueue {
    /// Messages available for delivery (FIFO order)
    available: VecDeque<StoredMessage>,
    /// In-flight messages keyed by receipt handle
    in_flight: HashMap<String, InFlightMessage>,
    /// Queue attributes returned by `queue_attributes`
    attributes: HashMap<String, String>,
    /// Count of messages deleted from this queue
    deleted: usize,
}

impl InMemoryQueue {
    fn new() -> Self {
        Self {
            available: VecDeque::new(),
            in_flight: HashMap::new(),
            attributes: HashMap::new(),
            deleted: 0,
        }
    }

    /// Return expired in-flight messages to the available deque.
    ///
    /// Their receipt handles become invalid; the next receive issues fresh ones.
    fn reclaim_expired(&mut self) {
        let now = Timestamp::now();
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, entry)| entry.visible_again_at <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        for receipt in expired {
            if let Some(entry) = self.in_flight.remove(&receipt) {
                self.available.push_back(entry.message);
            }
        }
    }
}

/// A message stored in the queue with delivery metadata
#[derive(Clone)]
struct StoredMessage {
    message_id: MessageId,
    body: Bytes,
    attributes: HashMap<String, String>,
    sent_at: Timestamp,
    receive_count: u32,
    first_received_at: Option<Timestamp>,
}

impl StoredMessage {
    fn from_message(message: Message, message_id: MessageId) -> Self {
        Self {
            message_id,
            body: message.body,
            attributes: message.attributes,
            sent_at: Timestamp::now(),
            receive_count: 0,
            first_received_at: None,
        }
    }
}

/// A message currently being processed by a consumer
struct InFlightMessage {
    message: StoredMessage,
    visible_again_at: Timestamp,
}

// ============================================================================
// InMemoryQueueClient
// ============================================================================

/// In-memory queue client implementation
pub struct InMemoryQueueClient {
    storage: Arc<Mutex<QueueStorage>>,
}

impl InMemoryQueueClient {
    /// Create new in-memory client with no queues
    pub fn new() -> Self {
        Self {
            storage: Arc::new(Mutex::new(QueueStorage::new())),
        }
    }

    /// Set an attribute on an existing queue
    pub async fn set_queue_attribute(
        &self,
        queue: &QueueName,
        key: String,
        value: String,
    ) -> Result<(), QueueError> {
        let mut storage = self.storage.lock().await;
        storage.queue_mut(queue)?.attributes.insert(key, value);
        Ok(())
    }

    /// Number of messages currently available for delivery
    pub async fn available_count(&self, queue: &QueueName) -> Result<usize, QueueError> {
        let mut storage = self.storage.lock().await;
        let q = storage.queue_mut(queue)?;
        q.reclaim_expired();
        Ok(q.available.len())
    }

    /// Number of messages currently in flight
    pub async fn in_flight_count(&self, queue: &QueueName) -> Result<usize, QueueError> {
        let mut storage = self.storage.lock().await;
        let q = storage.queue_mut(queue)?;
        q.reclaim_expired();
        Ok(q.in_flight.len())
    }

    /// Number of messages deleted from the queue so far
    pub async fn deleted_count(&self, queue: &QueueName) -> Result<usize, QueueError> {
        let mut storage = self.storage.lock().await;
        Ok(storage.queue_mut(queue)?.deleted)
    }

    /// Single non-waiting receive pass over a queue
    async fn try_receive(
        &self,
        queue: &QueueName,
        request: &ReceiveRequest,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let mut storage = self.storage.lock().await;
        let q = storage.queue_mut(queue)?;
        q.reclaim_expired();

        let now = Timestamp::now();
        let visible_again_at =
            Timestamp::from_datetime(now.as_datetime() + request.visibility_timeout);
        let mut received = Vec::new();

        while received.len() < request.max_messages as usize {
            let Some(mut stored) = q.available.pop_front() else {
                break;
            };

            stored.receive_count += 1;
            if stored.first_received_at.is_none() {
                stored.first_received_at = Some(now.clone());
            }

            let receipt = ReceiptHandle::new(uuid::Uuid::new_v4().to_string(), queue.clone());
            let attributes: HashMap<String, String> = stored
                .attributes
                .iter()
                .filter(|(name, _)| request.attribute_names.includes(name))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect();

            received.push(ReceivedMessage {
                message_id: stored.message_id.clone(),
                body: stored.body.clone(),
                attributes,
                receipt_handle: receipt.clone(),
                receive_count: stored.receive_count,
                sent_at: stored.sent_at.clone(),
                first_received_at: stored
                    .first_received_at
                    .clone()
                    .unwrap_or_else(|| now.clone()),
                received_at: now.clone(),
            });

            q.in_flight.insert(
                receipt.handle().to_string(),
                InFlightMessage {
                    message: stored,
                    visible_again_at: visible_again_at.clone(),
                },
            );
        }

        Ok(received)
    }
}

impl Default for InMemoryQueueClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueClient for InMemoryQueueClient {
    async fn receive_messages(
        &self,
        queue: &QueueName,
        request: &ReceiveRequest,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let deadline = Utc::now() + request.wait_time;

        loop {
            let received = self.try_receive(queue, request).await?;
            if !received.is_empty() || Utc::now() >= deadline {
                return Ok(received);
            }

            // Emulate long polling by ticking until the wait elapses
            tokio::time::sleep(std::time::Duration::from_millis(LONG_POLL_TICK_MS)).await;
        }
    }

    async fn delete_message(
        &self,
        queue: &QueueName,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError> {
        let mut storage = self.storage.lock().await;
        let q = storage.queue_mut(queue)?;
        q.reclaim_expired();

        match q.in_flight.remove(receipt.handle()) {
            Some(_) => {
                q.deleted += 1;
                Ok(())
            }
            None => Err(QueueError::ReceiptInvalid {
                receipt: receipt.handle().to_string(),
            }),
        }
    }

    async fn delete_messages(
        &self,
        queue: &QueueName,
        receipts: &[ReceiptHandle],
    ) -> Result<(), QueueError> {
        if receipts.len() > MAX_DELETE_BATCH_SIZE {
            return Err(QueueError::BatchTooLarge {
                size: receipts.len(),
                max_size: MAX_DELETE_BATCH_SIZE,
            });
        }

        let mut storage = self.storage.lock().await;
        let q = storage.queue_mut(queue)?;
        q.reclaim_expired();

        for receipt in receipts {
            // Stale receipts are skipped rather than failing the whole batch,
            // matching queue services' partial-failure batch semantics
            match q.in_flight.remove(receipt.handle()) {
                Some(_) => q.deleted += 1,
                None => {
                    tracing::debug!(receipt = %receipt, "batch delete skipped stale receipt");
                }
            }
        }

        Ok(())
    }

    async fn change_visibility(
        &self,
        queue: &QueueName,
        receipt: &ReceiptHandle,
        timeout: Duration,
    ) -> Result<(), QueueError> {
        let mut storage = self.storage.lock().await;
        let q = storage.queue_mut(queue)?;
        q.reclaim_expired();

        if !q.in_flight.contains_key(receipt.handle()) {
            return Err(QueueError::ReceiptInvalid {
                receipt: receipt.handle().to_string(),
            });
        }

        if timeout <= Duration::zero() {
            // Immediate release: the receipt is invalidated and the message
            // goes back to the available deque
            if let Some(entry) = q.in_flight.remove(receipt.handle()) {
                q.available.push_back(entry.message);
            }
        } else if let Some(entry) = q.in_flight.get_mut(receipt.handle()) {
            entry.visible_again_at = Timestamp::from_datetime(Utc::now() + timeout);
        }

        Ok(())
    }

    async fn send_message(
        &self,
        queue: &QueueName,
        message: Message,
    ) -> Result<MessageId, QueueError> {
        let mut storage = self.storage.lock().await;
        let q = storage.queue_mut(queue)?;

        let message_id = MessageId::new();
        q.available
            .push_back(StoredMessage::from_message(message, message_id.clone()));

        Ok(message_id)
    }

    async fn queue_exists(&self, queue: &QueueName) -> Result<bool, QueueError> {
        let storage = self.storage.lock().await;
        Ok(storage.queues.contains_key(queue))
    }

    async fn create_queue(&self, queue: &QueueName) -> Result<(), QueueError> {
        let mut storage = self.storage.lock().await;
        storage
            .queues
            .entry(queue.clone())
            .or_insert_with(InMemoryQueue::new);
        Ok(())
    }

    async fn queue_attributes(
        &self,
        queue: &QueueName,
        names: &[String],
    ) -> Result<HashMap<String, String>, QueueError> {
        let mut storage = self.storage.lock().await;
        let q = storage.queue_mut(queue)?;

        Ok(q.attributes
            .iter()
            .filter(|(name, _)| names.iter().any(|n| n == *name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect())
    }

    fn max_delete_batch_size(&self) -> usize {
        MAX_DELETE_BATCH_SIZE
    }
}
