//! Retry policy for node execution.
//!
//! `max_attempts` bounds the total number of processor invocations for a
//! node; only errors classified as retryable consume more than one. Delays
//! grow as `base * 2^(attempt-1)` and are capped.

use std::time::Duration;

use nodeflow_types::workflow::ExecutionSettings;

use super::error::ProcessorError;

/// Retry budget and backoff for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total invocations allowed per node (always at least 1).
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Policy for a run with the given effective settings.
    pub fn from_settings(settings: &ExecutionSettings, max_delay: Duration) -> Self {
        Self::new(
            settings.max_retries,
            Duration::from_millis(settings.retry_base_delay_ms),
            max_delay,
        )
    }

    /// Whether a failure on 1-based `attempt` should be retried.
    pub fn should_retry(&self, attempt: u32, error: &ProcessorError) -> bool {
        error.is_retryable() && attempt < self.max_attempts
    }

    /// Delay to wait after failed `attempt` (1-based) before the next one.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_from_one_second() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(30));
        assert_eq!(policy.delay_for(6), Duration::from_secs(30));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn attempts_bounded_by_budget() {
        let policy = RetryPolicy::new(3, Duration::ZERO, Duration::ZERO);
        let transient = ProcessorError::Transient("503".into());
        assert!(policy.should_retry(1, &transient));
        assert!(policy.should_retry(2, &transient));
        assert!(!policy.should_retry(3, &transient));
    }

    #[test]
    fn fatal_errors_never_retry() {
        let policy = RetryPolicy::new(5, Duration::ZERO, Duration::ZERO);
        assert!(!policy.should_retry(1, &ProcessorError::InvalidConfig("x".into())));
    }

    #[test]
    fn zero_budget_still_runs_once() {
        let policy = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO);
        assert_eq!(policy.max_attempts, 1);
        assert!(!policy.should_retry(1, &ProcessorError::Transient("x".into())));
    }

    #[test]
    fn from_settings_uses_base_delay() {
        let settings = ExecutionSettings {
            max_retries: 4,
            retry_base_delay_ms: 10,
            ..Default::default()
        };
        let policy = RetryPolicy::from_settings(&settings, Duration::from_secs(1));
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.delay_for(3), Duration::from_millis(40));
    }
}
