//! # Exponential Backoff
//!
//! Retry delays for transient failures and blocked resources.
//!
//! The nth consecutive failure waits `base * 2^(n-1)`, capped at `max`, plus a uniform
//! jitter of up to `jitter_ratio` of that delay so that resources failing together do
//! not retry in lockstep. Rate-limited calls wait until the remote bucket resets, and
//! never less than a minute.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Default jitter bound as a fraction of the delay
pub const DEFAULT_JITTER_RATIO: f64 = 0.2;

/// Minimum wait after a rate-limited call
pub const RATE_LIMIT_FLOOR: Duration = Duration::from_secs(60);

/// Exponential backoff calculator
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    jitter_ratio: f64,
    /// Consecutive failures seen so far
    attempt: u32,
}

impl ExponentialBackoff {
    /// Create a backoff growing from `base` up to `max`
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            jitter_ratio: DEFAULT_JITTER_RATIO,
            attempt: 0,
        }
    }

    /// Record a failure and return the delay before the next attempt
    pub fn next_backoff(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        let delay = Self::calculate_for_error_count(self.attempt, self.base, self.max);
        jitter(delay, self.jitter_ratio)
    }

    /// Delay for the given failure count without jitter (stateless)
    ///
    /// # Arguments
    ///
    /// * `error_count` - Consecutive failures, 1 for the first
    /// * `base` - Delay after the first failure
    /// * `max` - Cap on the delay
    #[must_use]
    pub fn calculate_for_error_count(error_count: u32, base: Duration, max: Duration) -> Duration {
        let exponent = error_count.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        base.checked_mul(factor).map_or(max, |delay| delay.min(max))
    }
}

fn jitter(delay: Duration, ratio: f64) -> Duration {
    if ratio <= 0.0 {
        return delay;
    }
    delay + delay.mul_f64(ratio * fastrand::f64())
}

/// Delay before retrying a rate-limited call
#[must_use]
pub fn rate_limit_delay(reset: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Duration {
    reset
        .and_then(|reset| (reset - now).to_std().ok())
        .map_or(RATE_LIMIT_FLOOR, |wait| wait.max(RATE_LIMIT_FLOOR))
}

#[cfg(test)]
mod tests {
    use super::*;

    impl ExponentialBackoff {
        fn with_jitter(mut self, ratio: f64) -> Self {
            self.jitter_ratio = ratio;
            self
        }

        fn reset(&mut self) {
            self.attempt = 0;
        }
    }

    #[test]
    fn test_exponential_sequence() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(5), Duration::from_secs(300)).with_jitter(0.0);

        assert_eq!(backoff.next_backoff(), Duration::from_secs(5));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(10));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(20));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(40));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(80));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(160));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(300)); // capped
        assert_eq!(backoff.next_backoff(), Duration::from_secs(300));
        assert_eq!(backoff.attempt, 8);
    }

    #[test]
    fn test_reset() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(5), Duration::from_secs(300)).with_jitter(0.0);
        backoff.next_backoff();
        backoff.next_backoff();
        backoff.reset();
        assert_eq!(backoff.attempt, 0);
        assert_eq!(backoff.next_backoff(), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_within_bound() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(10), Duration::from_secs(300));
        for _ in 0..50 {
            backoff.reset();
            let delay = backoff.next_backoff();
            assert!(delay >= Duration::from_secs(10));
            assert!(delay <= Duration::from_secs(12));
        }
    }

    #[test]
    fn test_large_error_counts_saturate_at_max() {
        let max = Duration::from_secs(300);
        assert_eq!(
            ExponentialBackoff::calculate_for_error_count(1_000, Duration::from_secs(5), max),
            max
        );
        assert_eq!(
            ExponentialBackoff::calculate_for_error_count(0, Duration::from_secs(5), max),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_rate_limit_delay_uses_reset() {
        let now = Utc::now();
        let reset = now + chrono::Duration::seconds(90);
        assert_eq!(rate_limit_delay(Some(reset), now), Duration::from_secs(90));
    }

    #[test]
    fn test_rate_limit_delay_floor() {
        let now = Utc::now();
        assert_eq!(rate_limit_delay(None, now), RATE_LIMIT_FLOOR);
        assert_eq!(
            rate_limit_delay(Some(now + chrono::Duration::seconds(5)), now),
            RATE_LIMIT_FLOOR
        );
        assert_eq!(
            rate_limit_delay(Some(now - chrono::Duration::seconds(5)), now),
            RATE_LIMIT_FLOOR
        );
    }
}
