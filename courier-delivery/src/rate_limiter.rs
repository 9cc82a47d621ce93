//! Token bucket limiting operator-initiated resends
//!
//! - Tokens are added to the bucket at a constant rate (`messages_per_second`)
//! - Each resend consumes one token
//! - The bucket holds at most `burst_size` tokens
//!
//! Time is read from [`tokio::time::Instant`], so a paused test clock also
//! pauses refills.

use std::time::Duration;

use courier_common::tracing;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::time::Instant;

/// Configuration for resend rate limiting
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RateLimitConfig {
    /// Sustained resends per second
    #[serde(default = "default_messages_per_second")]
    pub messages_per_second: f64,

    /// Resends allowed back to back (max tokens in bucket)
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            messages_per_second: default_messages_per_second(),
            burst_size: default_burst_size(),
        }
    }
}

const fn default_messages_per_second() -> f64 {
    1.0
}

const fn default_burst_size() -> u32 {
    10
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(messages_per_second: f64, burst_size: u32) -> Self {
        let capacity = f64::from(burst_size);
        Self {
            tokens: capacity,
            capacity,
            refill_rate: messages_per_second.max(0.0),
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();

        self.tokens = elapsed.mul_add(self.refill_rate, self.tokens).min(self.capacity);
        self.last_refill = now;
    }

    fn try_consume(&mut self) -> bool {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn time_until_available(&mut self) -> Duration {
        self.refill();

        if self.tokens >= 1.0 {
            return Duration::ZERO;
        }
        if self.refill_rate <= 0.0 {
            return Duration::MAX;
        }

        Duration::try_from_secs_f64((1.0 - self.tokens) / self.refill_rate).unwrap_or(Duration::MAX)
    }
}

/// Single shared token bucket
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(
                config.messages_per_second,
                config.burst_size,
            )),
        }
    }

    /// Take a token if one is available
    ///
    /// Returns `Err` with the wait until the next token otherwise.
    pub fn check_rate_limit(&self) -> Result<(), Duration> {
        let mut bucket = self.bucket.lock();

        if bucket.try_consume() {
            Ok(())
        } else {
            let wait_time = bucket.time_until_available();
            drop(bucket);
            tracing::debug!(
                wait_seconds = wait_time.as_secs_f64(),
                "Resend rate limit exceeded"
            );
            Err(wait_time)
        }
    }
}
