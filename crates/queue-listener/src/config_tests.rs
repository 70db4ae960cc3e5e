//! Tests for listener configuration.

use super::*;

#[test]
fn test_default_config() {
    let config = ListenerConfig::default();
    assert_eq!(config.batch_size, 10);
    assert_eq!(config.poll_wait, Duration::seconds(20));
    assert_eq!(config.visibility_timeout, Duration::seconds(30));
    assert_eq!(config.max_concurrent_messages, 10);
    assert_eq!(config.handler_timeout, Duration::seconds(30));
    assert_eq!(config.shutdown_timeout, Duration::seconds(20));
    assert_eq!(config.queue_not_found_strategy, QueueNotFoundStrategy::Fail);
    assert!(config.queue_attribute_names.is_empty());
    assert_eq!(config.message_attribute_names, AttributeSet::All);
    assert!(config.validate().is_ok());
}

#[test]
fn test_default_retry_config() {
    let retry = RetryConfig::default();
    assert_eq!(retry.max_attempts, 3);
    assert!(matches!(retry.backoff, BackoffMode::Immediate));
    assert!(retry.dead_letter_queue.is_none());
}

#[test]
fn test_builder_methods() {
    let dlq = QueueName::new("orders-dlq".to_string()).unwrap();
    let config = ListenerConfig::new()
        .with_batch_size(5)
        .with_poll_wait(Duration::seconds(10))
        .with_visibility_timeout(Duration::seconds(60))
        .with_max_concurrent_messages(4)
        .with_handler_timeout(Duration::seconds(5))
        .with_shutdown_timeout(Duration::seconds(3))
        .with_queue_not_found_strategy(QueueNotFoundStrategy::Create)
        .with_queue_attribute_names(vec!["ApproximateNumberOfMessages".to_string()])
        .with_message_attribute_names(AttributeSet::None)
        .with_retry(RetryConfig {
            max_attempts: 7,
            backoff: BackoffMode::Immediate,
            dead_letter_queue: Some(dlq.clone()),
        })
        .with_delete_batch_size(5);

    assert_eq!(config.batch_size, 5);
    assert_eq!(config.poll_wait, Duration::seconds(10));
    assert_eq!(config.visibility_timeout, Duration::seconds(60));
    assert_eq!(config.max_concurrent_messages, 4);
    assert_eq!(config.handler_timeout, Duration::seconds(5));
    assert_eq!(config.shutdown_timeout, Duration::seconds(3));
    assert_eq!(
        config.queue_not_found_strategy,
        QueueNotFoundStrategy::Create
    );
    assert_eq!(config.message_attribute_names, AttributeSet::None);
    assert_eq!(config.retry.max_attempts, 7);
    assert_eq!(config.retry.dead_letter_queue, Some(dlq));
    assert_eq!(config.delete_batch_size, 5);
    assert!(config.validate().is_ok());
}

#[test]
fn test_validate_rejects_zero_batch_size() {
    let config = ListenerConfig::new().with_batch_size(0);
    assert!(matches!(
        config.validate(),
        Err(ConfigError::OutOfRange { field, .. }) if field == "batch_size"
    ));
}

#[test]
fn test_validate_rejects_oversized_batch() {
    let config = ListenerConfig::new().with_batch_size(11);
    assert!(matches!(
        config.validate(),
        Err(ConfigError::OutOfRange { field, .. }) if field == "batch_size"
    ));
}

#[test]
fn test_validate_rejects_zero_concurrency() {
    let config = ListenerConfig::new().with_max_concurrent_messages(0);
    assert!(matches!(
        config.validate(),
        Err(ConfigError::OutOfRange { field, .. }) if field == "max_concurrent_messages"
    ));
}

#[test]
fn test_validate_rejects_nonpositive_timeouts() {
    let config = ListenerConfig::new().with_visibility_timeout(Duration::zero());
    assert!(config.validate().is_err());

    let config = ListenerConfig::new().with_handler_timeout(Duration::seconds(-1));
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_rejects_negative_poll_wait() {
    let config = ListenerConfig::new().with_poll_wait(Duration::seconds(-1));
    assert!(matches!(
        config.validate(),
        Err(ConfigError::OutOfRange { field, .. }) if field == "poll_wait"
    ));

    // Zero poll wait is a valid short poll
    let config = ListenerConfig::new().with_poll_wait(Duration::zero());
    assert!(config.validate().is_ok());
}

#[test]
fn test_validate_rejects_zero_delete_batch() {
    let config = ListenerConfig::new().with_delete_batch_size(0);
    assert!(matches!(
        config.validate(),
        Err(ConfigError::OutOfRange { field, .. }) if field == "delete_batch_size"
    ));
}

#[test]
fn test_validate_rejects_zero_max_attempts() {
    let config = ListenerConfig::new().with_retry(RetryConfig {
        max_attempts: 0,
        backoff: BackoffMode::Immediate,
        dead_letter_queue: None,
    });
    assert!(matches!(
        config.validate(),
        Err(ConfigError::OutOfRange { field, .. }) if field == "retry.max_attempts"
    ));
}

#[test]
fn test_to_std_clamps_negative_durations() {
    assert_eq!(to_std(Duration::seconds(2)), std::time::Duration::from_secs(2));
    assert_eq!(to_std(Duration::seconds(-2)), std::time::Duration::ZERO);
}
