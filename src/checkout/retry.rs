// Retry policy for checkout attempts.
//
// Only transient database conditions are retried. Every attempt starts a new
// transaction, so nothing from a failed attempt survives into the next one.

use rand::Rng;
use std::time::Duration;

use crate::config::CheckoutSettings;

/// Exponential backoff with jitter, bounded by a retry count
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &CheckoutSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: settings.retry_base,
            max_delay: Duration::from_secs(2),
            attempt_timeout: settings.attempt_timeout,
        }
    }

    /// Total attempts, the first one included
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based), without jitter
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Backoff with up to 50% random jitter added
    pub fn backoff_with_jitter(&self, retry: u32) -> Duration {
        let base = self.backoff(retry);
        let jitter_ms = base.as_millis() as u64 / 2;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}
