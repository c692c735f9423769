//! Retry policy with exponential backoff

use crate::core::RetryConfig;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per cycle, including the first
    pub attempts: u32,
    pub delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self::from(&RetryConfig::default())
    }

    /// Whether another attempt may follow attempt number `attempt` (1-based)
    pub fn allows_another(&self, attempt: u32) -> bool {
        attempt < self.attempts
    }

    /// Delay before retry number `retry` (1-based)
    ///
    /// `delay * backoff_factor^(retry - 1)`, capped at `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let millis = self.delay.as_millis() as f64 * self.backoff_factor.powi(exponent);
        let max = self.max_delay.as_millis() as f64;

        if !millis.is_finite() || millis >= max {
            self.max_delay
        } else {
            Duration::from_millis(millis.max(0.0) as u64)
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            attempts: config.attempts.max(1),
            delay: Duration::from_millis(config.delay),
            backoff_factor: config.backoff_factor,
            max_delay: Duration::from_millis(config.max_delay),
        }
    }
}
