//! Exponential backoff retry policy for outbound dispatch.
//!
//! Applied only to attempts the circuit breaker allowed through, and only
//! for retryable errors (timeouts, transport failures, executor 5xx).

use std::time::Duration;

use agentry_types::config::RetryConfig;
use agentry_types::error::DispatchError;

/// Stateless retry policy. `attempt` is the 0-based count of completed
/// attempts (first failure is attempt 0).
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Whether to re-attempt after `error` with `attempt` failures so far.
    pub fn should_retry(&self, attempt: u32, error: &DispatchError) -> bool {
        attempt < self.config.max_retries && error.is_retryable()
    }

    /// Backoff before re-attempting: `min(initial * multiplier^attempt, max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.config.backoff_multiplier.powi(attempt as i32);
        let ms = (self.config.initial_delay_ms as f64 * factor).min(self.config.max_delay_ms as f64);
        Duration::from_millis(ms as u64)
    }
}
