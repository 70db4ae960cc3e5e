//! Per-queue listener configuration.

use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use chrono::Duration;
use queue_client::{AttributeSet, QueueName};

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Largest receive batch accepted by common queue services
const MAX_BATCH_SIZE: u32 = 10;

/// What to do when a registered queue does not exist, evaluated at start
/// and whenever polling discovers the queue has disappeared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueNotFoundStrategy {
    /// Abort container start (or stop this queue's polling) and surface the condition
    #[default]
    Fail,
    /// Attempt to create the queue, then continue polling
    Create,
    /// Log and skip this queue's polling cycle without affecting other queues
    Ignore,
}

/// How failed messages are released back for another attempt
#[derive(Debug, Clone)]
pub enum BackoffMode {
    /// Reset visibility to zero for immediate redelivery
    Immediate,
    /// Reset visibility to an exponential backoff delay
    Delayed(RetryPolicy),
}

/// Failure policy applied by the acknowledgment resolver
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum processing attempts before a message is dead-lettered
    /// (or left to redeliver naturally when no dead-letter queue is set)
    pub max_attempts: u32,
    /// Delay applied when releasing a failed message for retry
    pub backoff: BackoffMode,
    /// Target queue for messages that exhausted their attempts
    pub dead_letter_queue: Option<QueueName>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffMode::Immediate,
            dead_letter_queue: None,
        }
    }
}

/// Configuration for one queue's listener
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Maximum messages requested per poll (1..=10)
    pub batch_size: u32,
    /// Long-poll wait for each receive call
    pub poll_wait: Duration,
    /// Visibility timeout applied to received messages; the lease is renewed
    /// at half this interval while a handler runs
    pub visibility_timeout: Duration,
    /// Maximum messages processed concurrently for this queue
    pub max_concurrent_messages: usize,
    /// Deadline for a single handler invocation
    pub handler_timeout: Duration,
    /// Graceful drain window on stop; in-flight messages still running after
    /// this are abandoned and left to redeliver
    pub shutdown_timeout: Duration,
    /// Behavior when the queue does not exist
    pub queue_not_found_strategy: QueueNotFoundStrategy,
    /// Queue attributes fetched once at start and attached to every received
    /// message's attributes
    pub queue_attribute_names: Vec<String>,
    /// Which message attributes to fetch with each message
    pub message_attribute_names: AttributeSet,
    /// Failure policy (attempts, backoff, dead-letter target)
    pub retry: RetryConfig,
    /// Pending deletes are flushed at this interval
    pub delete_flush_interval: std::time::Duration,
    /// Pending deletes are flushed immediately once this many accumulate
    pub delete_batch_size: usize,
    /// Transient receive-error budget; exhausting it stops this queue's source
    pub source_retry: RetryPolicy,
    /// Bounded transient retry for resolver queue operations
    pub operation_retry: RetryPolicy,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_wait: Duration::seconds(20),
            visibility_timeout: Duration::seconds(30),
            max_concurrent_messages: 10,
            handler_timeout: Duration::seconds(30),
            shutdown_timeout: Duration::seconds(20),
            queue_not_found_strategy: QueueNotFoundStrategy::default(),
            queue_attribute_names: Vec::new(),
            message_attribute_names: AttributeSet::All,
            retry: RetryConfig::default(),
            delete_flush_interval: std::time::Duration::from_millis(200),
            delete_batch_size: 10,
            source_retry: RetryPolicy::default(),
            operation_retry: RetryPolicy::new(
                3,
                std::time::Duration::from_millis(100),
                std::time::Duration::from_secs(2),
                2.0,
            ),
        }
    }
}

impl ListenerConfig {
    /// Create configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum messages requested per poll
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set long-poll wait time
    pub fn with_poll_wait(mut self, poll_wait: Duration) -> Self {
        self.poll_wait = poll_wait;
        self
    }

    /// Set visibility timeout for received messages
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Set per-queue concurrency limit
    pub fn with_max_concurrent_messages(mut self, max: usize) -> Self {
        self.max_concurrent_messages = max;
        self
    }

    /// Set handler invocation deadline
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// Set graceful shutdown drain window
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set queue-not-found strategy
    pub fn with_queue_not_found_strategy(mut self, strategy: QueueNotFoundStrategy) -> Self {
        self.queue_not_found_strategy = strategy;
        self
    }

    /// Set queue attributes to fetch at start and attach to messages
    pub fn with_queue_attribute_names(mut self, names: Vec<String>) -> Self {
        self.queue_attribute_names = names;
        self
    }

    /// Set which message attributes to fetch
    pub fn with_message_attribute_names(mut self, names: AttributeSet) -> Self {
        self.message_attribute_names = names;
        self
    }

    /// Set failure policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set delete flush interval
    pub fn with_delete_flush_interval(mut self, interval: std::time::Duration) -> Self {
        self.delete_flush_interval = interval;
        self
    }

    /// Set pending-delete count that triggers an immediate flush
    pub fn with_delete_batch_size(mut self, size: usize) -> Self {
        self.delete_batch_size = size;
        self
    }

    /// Set transient receive-error budget
    pub fn with_source_retry(mut self, policy: RetryPolicy) -> Self {
        self.source_retry = policy;
        self
    }

    /// Set resolver operation retry policy
    pub fn with_operation_retry(mut self, policy: RetryPolicy) -> Self {
        self.operation_retry = policy;
        self
    }

    /// Validate field ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::OutOfRange {
                field: "batch_size".to_string(),
                message: format!("must be 1-{}", MAX_BATCH_SIZE),
            });
        }

        if self.max_concurrent_messages == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_concurrent_messages".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.visibility_timeout <= Duration::zero() {
            return Err(ConfigError::OutOfRange {
                field: "visibility_timeout".to_string(),
                message: "must be positive".to_string(),
            });
        }

        if self.handler_timeout <= Duration::zero() {
            return Err(ConfigError::OutOfRange {
                field: "handler_timeout".to_string(),
                message: "must be positive".to_string(),
            });
        }

        if self.poll_wait < Duration::zero() {
            return Err(ConfigError::OutOfRange {
                field: "poll_wait".to_string(),
                message: "must not be negative".to_string(),
            });
        }

        if self.delete_batch_size == 0 {
            return Err(ConfigError::OutOfRange {
                field: "delete_batch_size".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::OutOfRange {
                field: "retry.max_attempts".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

/// Convert a chrono duration to std, clamping negatives to zero
pub(crate) fn to_std(duration: Duration) -> std::time::Duration {
    duration.to_std().unwrap_or(std::time::Duration::ZERO)
}
