//! Retry for deployment-manager calls
//!
//! Only transient status codes (`Unavailable`, `Unknown`) are retried.

use std::future::Future;
use std::time::Duration;
use tonic::Code;
use tracing::warn;

/// Attempt budget and backoff floor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based), doubling each time
    pub fn delay(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }
}

pub fn is_retryable(code: Code) -> bool {
    matches!(code, Code::Unavailable | Code::Unknown)
}

/// Run `call` until it succeeds, fails permanently or the budget is spent.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut call: F) -> Result<T, tonic::Status>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, tonic::Status>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(status) if is_retryable(status.code()) && attempt + 1 < policy.attempts => {
                let delay = policy.delay(attempt);
                warn!(
                    "Transient RPC failure ({:?}: {}), retrying in {:?}",
                    status.code(),
                    status.message(),
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(status) => return Err(status),
        }
    }
}
