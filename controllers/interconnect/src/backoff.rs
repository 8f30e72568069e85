//! # Exponential Failure Rate Limiter
//!
//! Per-key exponential backoff used as the error policy of every controller.
//!
//! The delay for a key is `base * 2^n`, capped at `max`, where `n` is the number
//! of consecutive failures recorded for that key. A successful reconcile forgets
//! the key, so the next failure starts again from `base`.
//!
//! With the default 10ms floor and 5s ceiling the sequence is
//! 10ms, 20ms, 40ms, 80ms, ... 2.56s, 5s, 5s.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Stateless exponential backoff calculator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    /// Delay after the first failure
    base: Duration,
    /// Upper bound for any delay
    max: Duration,
}

impl ExponentialBackoff {
    /// Create a backoff growing from `base` and capped at `max`
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay for the given number of previous failures (0-indexed)
    ///
    /// Saturates instead of overflowing for large failure counts.
    #[must_use]
    pub fn delay(&self, failures: u32) -> Duration {
        let factor = 1u32.checked_shl(failures).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

/// Per-key failure rate limiter
///
/// Cloning is cheap; clones share the same failure table.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    backoff: ExponentialBackoff,
    failures: Arc<Mutex<HashMap<String, u32>>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            backoff: ExponentialBackoff::new(base, max),
            failures: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record a failure for `key` and return how long to wait before retrying
    pub fn when(&self, key: &str) -> Duration {
        let mut failures = match self.failures.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let count = failures.entry(key.to_string()).or_insert(0);
        let delay = self.backoff.delay(*count);
        *count = count.saturating_add(1);
        delay
    }

    /// Forget `key` after a successful reconcile
    pub fn forget(&self, key: &str) {
        let mut failures = match self.failures.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        failures.remove(key);
    }

    /// Consecutive failures recorded for `key`
    pub fn failures(&self, key: &str) -> u32 {
        let failures = match self.failures.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        failures.get(key).copied().unwrap_or(0)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(crate::config::RATE_LIMIT_BASE, crate::config::RATE_LIMIT_MAX)
    }
}
