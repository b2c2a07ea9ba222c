//! Exponential backoff policy for retried network operations.

use crate::constants::{DEFAULT_BACKOFF_BASE_MS, DEFAULT_NETWORK_RETRIES};
use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;

/// Attempt budget and delay schedule for a retried operation.
///
/// `attempts` counts the first try, so a policy of 3 attempts sleeps at most
/// twice: `base`, then `2 * base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub attempts: u32,
    /// Delay before the second attempt.
    pub base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_NETWORK_RETRIES,
            base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given attempt budget and base delay.
    pub const fn new(attempts: u32, base: Duration) -> Self {
        Self { attempts, base }
    }

    /// Delays between consecutive attempts, doubling each time.
    ///
    /// Feed this to `tokio_retry::RetryIf::spawn`; the iterator length bounds
    /// the number of retries.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + use<> {
        let retries = self.attempts.max(1) - 1;
        let base_ms = u64::try_from(self.base.as_millis()).unwrap_or(u64::MAX);
        // The strategy yields 2 * base, 4 * base, ...; halving starts the schedule at base.
        ExponentialBackoff::from_millis(2)
            .factor(base_ms)
            .map(|delay| delay / 2)
            .take(retries as usize)
    }
}
