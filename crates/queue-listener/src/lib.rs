//! # Queue Listener
//!
//! A listener container for consuming messages from one or more queues with
//! configurable concurrency and failure policy.
//!
//! The container polls registered queues through a [`QueueClient`], dispatches
//! received messages to application-supplied handlers under per-queue and
//! optional process-wide concurrency limits, renews message visibility leases
//! while handlers run, and converts handler outcomes into queue operations:
//! success deletes (batched), failure retries via visibility reset or backoff,
//! and exhausted retries dead-letter when a target is configured.
//!
//! ## Module Organization
//!
//! - [`config`] - Per-queue listener configuration
//! - [`retry`] - Exponential backoff retry policies
//! - [`error`] - Listener error types and the surfaced wrapped failure
//! - [`handler`] - Handler traits and processing outcomes
//! - [`invoker`] - Deadline-bounded handler invocation
//! - [`inflight`] - In-flight entry bookkeeping
//! - [`visibility`] - Per-message lease renewal
//! - [`dispatcher`] - Concurrency-limited admission
//! - [`acknowledgement`] - Outcome resolution and batched deletes
//! - [`source`] - Per-queue polling loop
//! - [`container`] - Lifecycle orchestration

// Module declarations
pub mod acknowledgement;
pub mod config;
pub mod container;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod inflight;
pub mod invoker;
pub mod retry;
pub mod source;
pub mod visibility;

// Re-export commonly used types at crate root for convenience
pub use config::{BackoffMode, ListenerConfig, QueueNotFoundStrategy, RetryConfig};
pub use container::{ContainerState, ListenerContainer, ListenerContainerBuilder};
pub use error::{ConfigError, ErrorSink, ListenerError, ListenerExecutionFailed};
pub use handler::{BatchDisposition, BatchHandler, Handler, MessageHandler, Outcome};
pub use retry::{RetryPolicy, RetryState};

pub use queue_client::QueueClient;
