//! Retry policy for delivery attempts.
//!
//! Bounds the number of attempts per request, decides which failure kinds may
//! be retried at all, and computes the wait between attempts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::backoff::{Backoff, apply_jitter, calculate_delay};
use crate::FailureKind;

/// Retry policy configuration for delivery attempts.
///
/// # Example
///
/// ```ron
/// retry: (
///     max_attempts: 3,
///     interval_millis: 1000,
///     backoff: Exponential(multiplier: 2.0, max_interval_millis: 10000),
///     jitter_factor: 0.1,
///     non_retryable_failure_kinds: [Permanent],
/// ),
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first.
    ///
    /// Zero and one both mean a single attempt.
    ///
    /// Default: 3
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Wait before the first retry (in milliseconds).
    ///
    /// Default: 1000
    #[serde(default = "defaults::interval_millis")]
    pub interval_millis: u64,

    /// How the wait grows between retries.
    ///
    /// Default: `Fixed`
    #[serde(default)]
    pub backoff: Backoff,

    /// Randomise every wait within ±`jitter_factor`.
    ///
    /// Default: 0.0 (exact waits)
    #[serde(default)]
    pub jitter_factor: f64,

    /// Failure kinds that end processing after a single attempt.
    ///
    /// `Permanent` is never retried, whether listed or not.
    ///
    /// Default: `[Permanent]`
    #[serde(default = "defaults::non_retryable_failure_kinds")]
    pub non_retryable_failure_kinds: Vec<FailureKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            interval_millis: defaults::interval_millis(),
            backoff: Backoff::default(),
            jitter_factor: 0.0,
            non_retryable_failure_kinds: defaults::non_retryable_failure_kinds(),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed backoff without jitter
    #[must_use]
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval_millis: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            ..Self::default()
        }
    }

    /// Check if another attempt may follow `attempt_count` completed attempts.
    #[must_use]
    pub const fn should_retry(&self, attempt_count: u32) -> bool {
        attempt_count < self.max_attempts
    }

    /// Check if failures of this kind may be retried at all.
    #[must_use]
    pub fn is_retryable(&self, kind: FailureKind) -> bool {
        kind != FailureKind::Permanent && !self.non_retryable_failure_kinds.contains(&kind)
    }

    /// Get the number of remaining attempts.
    #[must_use]
    pub const fn remaining_attempts(&self, attempt_count: u32) -> u32 {
        self.max_attempts.saturating_sub(attempt_count)
    }

    /// Wait after the given (1-indexed) failed attempt.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        apply_jitter(
            calculate_delay(self.backoff, attempt, self.interval_millis),
            self.jitter_factor,
        )
    }
}

mod defaults {
    use crate::FailureKind;

    pub const fn max_attempts() -> u32 {
        3
    }

    pub const fn interval_millis() -> u64 {
        1000
    }

    pub fn non_retryable_failure_kinds() -> Vec<FailureKind> {
        vec![FailureKind::Permanent]
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.interval_millis, 1000);
        assert_eq!(policy.backoff, Backoff::Fixed);
        assert_eq!(policy.non_retryable_failure_kinds, vec![FailureKind::Permanent]);
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!policy.should_retry(4));
    }

    #[test]
    fn test_single_shot_policies() {
        for max_attempts in [0, 1] {
            let policy = RetryPolicy::fixed(max_attempts, Duration::from_millis(10));
            assert!(!policy.should_retry(1));
            assert_eq!(policy.remaining_attempts(1), 0);
        }
    }

    #[test]
    fn test_remaining_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.remaining_attempts(0), 3);
        assert_eq!(policy.remaining_attempts(2), 1);
        assert_eq!(policy.remaining_attempts(5), 0);
    }

    #[test]
    fn test_is_retryable() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_retryable(FailureKind::Permanent));
        assert!(policy.is_retryable(FailureKind::Transient));
        assert!(policy.is_retryable(FailureKind::Unknown));

        let policy = RetryPolicy {
            non_retryable_failure_kinds: vec![FailureKind::Permanent, FailureKind::Unknown],
            ..RetryPolicy::default()
        };
        assert!(!policy.is_retryable(FailureKind::Unknown));
    }

    #[test]
    fn test_permanent_is_never_retryable() {
        let policy: RetryPolicy = ron::from_str("(non_retryable_failure_kinds: [])").unwrap();

        assert!(policy.non_retryable_failure_kinds.is_empty());
        assert!(!policy.is_retryable(FailureKind::Permanent));
        assert!(policy.is_retryable(FailureKind::Transient));
    }

    #[test]
    fn test_policy_from_ron() {
        let policy: RetryPolicy = ron::from_str(
            "(max_attempts: 5, backoff: Exponential(multiplier: 3.0, max_interval_millis: 4000))",
        )
        .unwrap();

        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.interval_millis, 1000);
        assert_eq!(policy.delay_after(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(2), Duration::from_millis(3000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(4000));
        assert_eq!(policy.non_retryable_failure_kinds, vec![FailureKind::Permanent]);
    }
}
