//! Tests for retry policies.

use super::*;

#[test]
fn test_default_policy() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.max_attempts, 5);
    assert_eq!(policy.initial_delay, Duration::from_secs(1));
    assert_eq!(policy.max_delay, Duration::from_secs(16));
    assert!(policy.use_jitter);
}

#[test]
fn test_exponential_growth_without_jitter() {
    let policy = RetryPolicy::new(
        5,
        Duration::from_secs(1),
        Duration::from_secs(60),
        2.0,
    )
    .without_jitter();

    assert_eq!(policy.calculate_delay(0), Duration::from_secs(1));
    assert_eq!(policy.calculate_delay(1), Duration::from_secs(2));
    assert_eq!(policy.calculate_delay(2), Duration::from_secs(4));
    assert_eq!(policy.calculate_delay(3), Duration::from_secs(8));
}

#[test]
fn test_delay_capped_at_max() {
    let policy = RetryPolicy::new(
        10,
        Duration::from_secs(1),
        Duration::from_secs(5),
        2.0,
    )
    .without_jitter();

    assert_eq!(policy.calculate_delay(9), Duration::from_secs(5));
}

#[test]
fn test_jitter_stays_within_bounds() {
    let policy = RetryPolicy::new(
        3,
        Duration::from_secs(4),
        Duration::from_secs(60),
        2.0,
    )
    .with_jitter_percent(0.25);

    for _ in 0..100 {
        let delay = policy.calculate_delay(0);
        // 4s ±25% = [3s, 5s]
        assert!(delay >= Duration::from_secs(3), "delay too small: {:?}", delay);
        assert!(delay <= Duration::from_secs(5), "delay too large: {:?}", delay);
    }
}

#[test]
fn test_jitter_percent_clamped() {
    let policy = RetryPolicy::default().with_jitter_percent(2.0);
    assert_eq!(policy.jitter_percent, 1.0);

    let policy = RetryPolicy::default().with_jitter_percent(-1.0);
    assert_eq!(policy.jitter_percent, 0.0);
}

#[test]
fn test_should_retry_bounds() {
    let policy = RetryPolicy::default(); // max_attempts = 5

    assert!(policy.should_retry(0));
    assert!(policy.should_retry(4));
    assert!(!policy.should_retry(5));
}

#[test]
fn test_max_total_delay_sums_capped_schedule() {
    let policy = RetryPolicy::new(
        4,
        Duration::from_secs(1),
        Duration::from_secs(4),
        2.0,
    )
    .without_jitter();

    // 1 + 2 + 4 + 4 (capped)
    assert_eq!(policy.max_total_delay(), Duration::from_secs(11));
}

#[test]
fn test_max_total_delay_counts_jitter_at_worst_case() {
    let policy = RetryPolicy::new(
        2,
        Duration::from_secs(2),
        Duration::from_secs(60),
        2.0,
    )
    .with_jitter_percent(0.25);

    // (2 + 4) * 1.25
    assert_eq!(policy.max_total_delay(), Duration::from_secs_f64(7.5));
}

#[test]
fn test_retry_state_progression() {
    let policy = RetryPolicy::default();
    let mut state = RetryState::new();

    assert_eq!(state.total_attempts, 1);
    assert!(state.can_retry(&policy));

    for _ in 0..5 {
        state.next_attempt();
    }

    assert_eq!(state.attempt, 5);
    assert_eq!(state.total_attempts, 6);
    assert!(!state.can_retry(&policy));
}
