//! Exponential backoff between status checks.
//!
//! After a transient fault the poller waits longer before the next check;
//! a successful read drops the wait back to the profile's poll interval.

use std::time::Duration;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result never drops below `current` and is clamped to
/// [`BackoffConfig::max_delay`].
pub fn next_delay(current: Duration, config: &BackoffConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier.max(1.0)) as u64;
    Duration::from_millis(next_ms)
        .max(current)
        .min(config.max_delay.max(current))
}
