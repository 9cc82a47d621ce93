//! Backoff delay calculation with optional jitter

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Shape of the wait between attempts.
///
/// The starting interval is [`RetryPolicy::interval_millis`](crate::RetryPolicy).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Backoff {
    /// The same interval before every retry.
    #[default]
    Fixed,

    /// `interval * multiplier^(attempt - 1)`, capped at `max_interval_millis`.
    Exponential {
        multiplier: f64,
        max_interval_millis: u64,
    },
}

/// Exponents past this point are capped anyway.
const MAX_EXPONENT: i32 = 62;

/// Delay to wait after the given (1-indexed) failed attempt, before jitter.
#[must_use]
pub fn calculate_delay(backoff: Backoff, attempt: u32, interval_millis: u64) -> Duration {
    match backoff {
        Backoff::Fixed => Duration::from_millis(interval_millis),
        Backoff::Exponential {
            multiplier,
            max_interval_millis,
        } => {
            let exponent = i32::try_from(attempt.saturating_sub(1))
                .unwrap_or(MAX_EXPONENT)
                .min(MAX_EXPONENT);

            #[allow(
                clippy::cast_precision_loss,
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss
            )]
            let millis = {
                let scaled = (interval_millis as f64) * multiplier.max(1.0).powi(exponent);
                scaled.min(max_interval_millis as f64).max(0.0) as u64
            };

            Duration::from_millis(millis.min(max_interval_millis))
        }
    }
}

/// Randomise `duration` within ±`jitter_factor`.
///
/// A factor of zero (or less) leaves the duration untouched.
#[must_use]
pub fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor.is_nan() || jitter_factor <= 0.0 {
        return duration;
    }

    let clamped = jitter_factor.min(1.0);
    let jitter_range = duration.as_secs_f64() * clamped;
    let jitter = rand::rng().random_range(-jitter_range..=jitter_range);

    Duration::from_secs_f64((duration.as_secs_f64() + jitter).max(0.0))
}
