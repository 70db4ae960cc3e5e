//! Handler traits and processing outcomes.
//!
//! Handlers come in two shapes: single-message and batch. The shape is
//! resolved once at registration into the [`Handler`] variant, never by
//! inspecting messages at runtime.

use async_trait::async_trait;
use queue_client::ReceivedMessage;
use std::sync::Arc;

/// Result of processing one message.
///
/// Produced exactly once per message by the invoker and consumed exactly
/// once by the acknowledgment resolver.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Handler completed successfully; the message will be deleted
    Success,
    /// Handler returned or raised an error
    Failure(Arc<anyhow::Error>),
    /// Handler did not complete within the configured deadline
    Timeout,
}

impl Outcome {
    /// Wrap a failure cause
    pub fn failure(cause: anyhow::Error) -> Self {
        Self::Failure(Arc::new(cause))
    }

    /// Check if the outcome is a success
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Check if the outcome is any kind of failure (including timeout)
    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }
}

/// Application-supplied handler processing one message at a time
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process a single message; an `Err` routes the message through the
    /// configured retry/dead-letter policy
    async fn handle(&self, message: &ReceivedMessage) -> Result<(), anyhow::Error>;
}

/// Per-batch result returned by a [`BatchHandler`]
pub enum BatchDisposition {
    /// One result covering every message in the batch
    AllOf(Result<(), anyhow::Error>),
    /// One result per message, in batch order
    PerMessage(Vec<Result<(), anyhow::Error>>),
}

/// Application-supplied handler processing a whole polled batch at once
#[async_trait]
pub trait BatchHandler: Send + Sync {
    /// Process the polled batch; the disposition maps back to per-message
    /// outcomes
    async fn handle_batch(&self, messages: &[ReceivedMessage]) -> BatchDisposition;
}

/// Handler shape, resolved once at registration
#[derive(Clone)]
pub enum Handler {
    /// One invocation per message
    Single(Arc<dyn MessageHandler>),
    /// One invocation per polled batch
    Batch(Arc<dyn BatchHandler>),
}

impl Handler {
    /// Wrap a single-message handler
    pub fn single<H: MessageHandler + 'static>(handler: H) -> Self {
        Self::Single(Arc::new(handler))
    }

    /// Wrap a batch handler
    pub fn batch<H: BatchHandler + 'static>(handler: H) -> Self {
        Self::Batch(Arc::new(handler))
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(_) => f.write_str("Handler::Single"),
            Self::Batch(_) => f.write_str("Handler::Batch"),
        }
    }
}
