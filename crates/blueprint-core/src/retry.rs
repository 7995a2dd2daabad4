//! Retry policy and backoff calculation for resource/link deploy attempts
//! (spec §4.8, §4.9).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configures how a deployer retries a failed provider call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_factor: f64,
    /// Fraction of the computed backoff to randomly add or subtract, so
    /// concurrently-retrying resources don't all hammer the provider in
    /// lockstep.
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            backoff_factor: 2.0,
            jitter_fraction: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Computes the wait time before retry attempt number `attempt`
    /// (1-indexed: the wait before the *second* call overall), as
    /// exponential backoff capped at `max_backoff`, perturbed by
    /// `jitter_seed` scaled into `[-jitter_fraction, +jitter_fraction]`.
    ///
    /// `jitter_seed` is expected to be caller-supplied randomness in
    /// `[0.0, 1.0)`; this keeps the calculation itself deterministic and
    /// testable.
    pub fn calculate_retry_wait_time_ms(&self, attempt: u32, jitter_seed: f64) -> u64 {
        if attempt == 0 {
            return 0;
        }
        let exponent = (attempt - 1) as f64;
        let base = self.initial_backoff.as_millis() as f64 * self.backoff_factor.powf(exponent);
        let capped = base.min(self.max_backoff.as_millis() as f64);
        let jitter_range = capped * self.jitter_fraction;
        let jitter = (jitter_seed * 2.0 - 1.0) * jitter_range;
        (capped + jitter).max(0.0) as u64
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_until_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1000),
            backoff_factor: 2.0,
            jitter_fraction: 0.0,
        };
        assert_eq!(policy.calculate_retry_wait_time_ms(1, 0.5), 100);
        assert_eq!(policy.calculate_retry_wait_time_ms(2, 0.5), 200);
        assert_eq!(policy.calculate_retry_wait_time_ms(3, 0.5), 400);
        assert_eq!(policy.calculate_retry_wait_time_ms(5, 0.5), 1000);
        assert_eq!(policy.calculate_retry_wait_time_ms(10, 0.5), 1000);
    }

    #[test]
    fn should_retry_respects_max_attempts() {
        let policy = RetryPolicy { max_attempts: 3, ..RetryPolicy::default() };
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }
}
