//! Tests for listener error types.

use super::*;
use std::error::Error as _;
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn test_execution_failed_wraps_cause() {
    let failure = ListenerExecutionFailed::new(
        "handler for queue 'orders' failed",
        anyhow::anyhow!("payload was not valid json"),
    );

    assert_eq!(failure.message(), "handler for queue 'orders' failed");
    assert_eq!(failure.cause().to_string(), "payload was not valid json");
    assert_eq!(
        failure.to_string(),
        "handler for queue 'orders' failed: payload was not valid json"
    );
}

#[test]
fn test_execution_failed_exposes_source() {
    let failure = ListenerExecutionFailed::new("processing failed", anyhow::anyhow!("boom"));
    let source = failure.source().expect("source should be present");
    assert_eq!(source.to_string(), "boom");
}

#[test]
fn test_execution_failed_clone_shares_cause() {
    let failure = ListenerExecutionFailed::new("processing failed", anyhow::anyhow!("boom"));
    let cloned = failure.clone();
    assert_eq!(failure.to_string(), cloned.to_string());
}

#[test]
fn test_execution_failed_from_shared() {
    let cause = Arc::new(anyhow::anyhow!("shared cause"));
    let first = ListenerExecutionFailed::from_shared("first message", Arc::clone(&cause));
    let second = ListenerExecutionFailed::from_shared("second message", cause);

    assert_eq!(first.to_string(), "first message: shared cause");
    assert_eq!(second.to_string(), "second message: shared cause");
}

#[test]
fn test_listener_error_display() {
    let error = ListenerError::QueueNotFound {
        queue: "orders".to_string(),
    };
    assert_eq!(error.to_string(), "Queue not found: orders");

    let error = ListenerError::InvalidState {
        expected: "created".to_string(),
        actual: "running".to_string(),
    };
    assert_eq!(
        error.to_string(),
        "Invalid container state: expected created, was running"
    );
}

#[test]
fn test_listener_error_from_config_error() {
    let config_error = ConfigError::OutOfRange {
        field: "batch_size".to_string(),
        message: "must be 1-10".to_string(),
    };
    let error: ListenerError = config_error.into();
    assert!(matches!(error, ListenerError::Config(_)));
    assert!(error.to_string().contains("batch_size"));
}

#[test]
fn test_listener_error_from_queue_error() {
    let queue_error = QueueError::ConnectionFailed {
        message: "connection refused".to_string(),
    };
    let error: ListenerError = queue_error.into();
    assert!(matches!(error, ListenerError::Queue(_)));
}

#[test]
fn test_custom_error_sink_receives_failures() {
    let seen = Arc::new(AtomicUsize::new(0));
    let sink: ErrorSink = {
        let seen = Arc::clone(&seen);
        Arc::new(move |_failure| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
    };

    sink.as_ref()(ListenerExecutionFailed::new("one", anyhow::anyhow!("a")));
    sink.as_ref()(ListenerExecutionFailed::new("two", anyhow::anyhow!("b")));
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[test]
fn test_log_error_sink_is_callable() {
    let sink = log_error_sink();
    sink.as_ref()(ListenerExecutionFailed::new("ignored", anyhow::anyhow!("x")));
}
