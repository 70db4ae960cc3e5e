//! Error types for the listener container.

use queue_client::QueueError;
use std::sync::Arc;
use thiserror::Error;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

/// Failure of a handler invocation or a resolver queue operation, wrapped
/// with a descriptive message and the original cause.
///
/// This is the sole failure surface exposed to callers who do not supply
/// their own error callback: per-message failures never abort sibling
/// processing, they are reported through the container's error sink as
/// instances of this type.
#[derive(Debug, Clone)]
pub struct ListenerExecutionFailed {
    message: String,
    cause: Arc<anyhow::Error>,
}

impl ListenerExecutionFailed {
    /// Wrap a failure cause with a descriptive message
    pub fn new(message: impl Into<String>, cause: anyhow::Error) -> Self {
        Self {
            message: message.into(),
            cause: Arc::new(cause),
        }
    }

    /// Wrap an already shared failure cause
    pub fn from_shared(message: impl Into<String>, cause: Arc<anyhow::Error>) -> Self {
        Self {
            message: message.into(),
            cause,
        }
    }

    /// Descriptive message for this failure
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The original cause
    pub fn cause(&self) -> &anyhow::Error {
        &self.cause
    }
}

impl std::fmt::Display for ListenerExecutionFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.message, self.cause)
    }
}

impl std::error::Error for ListenerExecutionFailed {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let cause: &(dyn std::error::Error + 'static) = (*self.cause).as_ref();
        Some(cause)
    }
}

/// Errors surfaced by container lifecycle operations
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("Queue not found: {queue}")]
    QueueNotFound { queue: String },

    #[error("Invalid container state: expected {expected}, was {actual}")]
    InvalidState { expected: String, actual: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Queue operation failed: {0}")]
    Queue(#[from] QueueError),
}

/// Listener configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },

    #[error("Required configuration missing: {message}")]
    Missing { message: String },
}

/// Callback receiving every wrapped per-message failure
pub type ErrorSink = Arc<dyn Fn(ListenerExecutionFailed) + Send + Sync>;

/// Default error sink: logs the failure via tracing
pub fn log_error_sink() -> ErrorSink {
    Arc::new(|failure: ListenerExecutionFailed| {
        tracing::error!(error = %failure, "listener execution failed");
    })
}
