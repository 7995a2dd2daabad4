//! Jitter seed source for retry backoff. [`blueprint_core::retry::RetryPolicy`]
//! expects a caller-supplied seed in `[0.0, 1.0)` so the backoff calculation
//! itself stays deterministic and unit-testable; this is the one place that
//! actually draws randomness.

pub fn next_jitter_seed() -> f64 {
    rand::random::<f64>()
}
