//! Backoff policies for transient failures.
//!
//! Two consumers share these types: the message source backs off between
//! failed receive calls, and the acknowledgement path backs off between
//! failed delete, visibility, and dead-letter calls. Message-level retry
//! delays (the `Delayed` retry mode) are also computed from a policy here,
//! keyed by the message's receive count.

use rand::Rng;
use std::time::Duration;

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;

/// Exponential backoff schedule with optional jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed after the initial attempt
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Ceiling applied to every computed delay
    pub max_delay: Duration,

    /// Growth factor between consecutive delays
    pub backoff_multiplier: f64,

    /// Whether delays are randomized
    pub use_jitter: bool,

    /// Half-width of the jitter window as a fraction of the delay
    pub jitter_percent: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(16),
            backoff_multiplier: 2.0,
            use_jitter: true,
            jitter_percent: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Build a jittered policy from its schedule parameters
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            backoff_multiplier,
            use_jitter: true,
            jitter_percent: 0.25,
        }
    }

    /// Make delays deterministic; used by tests and fixed-latency setups
    pub fn without_jitter(mut self) -> Self {
        self.use_jitter = false;
        self
    }

    /// Override the jitter fraction, clamped to [0, 1]
    pub fn with_jitter_percent(mut self, percent: f64) -> Self {
        self.jitter_percent = percent.clamp(0.0, 1.0);
        self
    }

    /// Delay before the retry with the given 0-based attempt number.
    ///
    /// Grows the initial delay by the multiplier per attempt, caps it at
    /// `max_delay`, then randomizes within the jitter window if enabled.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let grown = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = grown.min(self.max_delay.as_secs_f64());

        let delay = if self.use_jitter {
            Self::add_jitter(capped, self.jitter_percent)
        } else {
            capped
        };

        Duration::from_secs_f64(delay)
    }

    /// Whether the 0-based attempt number is still within the budget
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Upper bound on the total time spent sleeping if every retry in the
    /// budget is consumed; jitter is counted at its worst case.
    ///
    /// Used to size drain windows that must outlast a retried operation.
    pub fn max_total_delay(&self) -> Duration {
        let jitter_factor = if self.use_jitter {
            1.0 + self.jitter_percent
        } else {
            1.0
        };

        let mut total = 0.0_f64;
        for attempt in 0..self.max_attempts {
            let grown =
                self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
            total += grown.min(self.max_delay.as_secs_f64()) * jitter_factor;
        }

        Duration::from_secs_f64(total)
    }

    fn add_jitter(delay_secs: f64, jitter_percent: f64) -> f64 {
        let half_width = delay_secs * jitter_percent;
        if half_width <= 0.0 {
            return delay_secs.max(0.0);
        }

        let offset = rand::rng().random_range(-half_width..=half_width);
        (delay_secs + offset).max(0.0)
    }
}

/// Attempt counter advancing through a policy's schedule.
#[derive(Debug, Clone)]
pub struct RetryState {
    /// Retries taken so far, 0-based
    pub attempt: u32,

    /// Attempts made including the initial one
    pub total_attempts: u32,
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryState {
    /// Fresh state before any retry
    pub fn new() -> Self {
        Self {
            attempt: 0,
            total_attempts: 1,
        }
    }

    /// Record another attempt
    pub fn next_attempt(&mut self) {
        self.attempt += 1;
        self.total_attempts += 1;
    }

    /// Delay before the next retry under the given policy
    pub fn get_delay(&self, policy: &RetryPolicy) -> Duration {
        policy.calculate_delay(self.attempt)
    }

    /// Whether the policy allows another retry
    pub fn can_retry(&self, policy: &RetryPolicy) -> bool {
        policy.should_retry(self.attempt)
    }
}
