//! # Queue Client
//!
//! Provider-agnostic queue operations for the queue-listener container.
//!
//! This library provides:
//! - The [`QueueClient`](client::QueueClient) trait covering receive, delete,
//!   batch delete, visibility change, send, and queue management operations
//! - Message structures and receipt handles
//! - A fully functional in-memory provider for testing and development
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all queue operations
//! - [`message`] - Message structures and receipt handles
//! - [`client`] - The client trait implemented by providers
//! - [`providers`] - Provider implementations

// Module declarations
pub mod client;
pub mod error;
pub mod message;
pub mod providers;

// Re-export commonly used types at crate root for convenience
pub use client::QueueClient;
pub use error::{QueueError, ValidationError};
pub use message::{
    AttributeSet, Message, MessageId, QueueName, ReceiptHandle, ReceiveRequest, ReceivedMessage,
    Timestamp,
};
pub use providers::InMemoryQueueClient;
