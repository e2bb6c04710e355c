//! Backoff schedule for transient transfer failures.

use crate::config::NetworkConfig;
use rand::Rng;
use std::time::Duration;

/// Exponential backoff with jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: NetworkConfig::DOWNLOAD_MAX_RETRIES,
            base_delay: NetworkConfig::DOWNLOAD_RETRY_BASE_DELAY,
            max_delay: NetworkConfig::DOWNLOAD_RETRY_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), doubled each time,
    /// capped, with up to 25% random jitter to spread reconnect storms.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let base = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.max_delay);
        let jitter = rand::rng().random_range(0.0..0.25);
        base.mul_f64(1.0 + jitter).min(self.max_delay)
    }

    pub fn attempts_exhausted(&self, attempt: u32) -> bool {
        attempt > self.max_retries
    }
}
