//! Bounded retry for transient remote failures.
//!
//! Wraps a single idempotent-or-safe-to-retry remote call. Only transient
//! failures (network unreachable, timeout, 5xx) are retried; validation and
//! authentication failures return immediately so callers can react to the
//! error kind. Exhausting the bound surfaces the last observed error.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::api::ApiError;

/// Retry policy: a fixed attempt bound with a fixed inter-attempt delay.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    /// Create a policy. `attempts` is clamped to at least 1.
    #[must_use]
    pub const fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: if attempts == 0 { 1 } else { attempts },
            delay,
        }
    }

    /// Attempt bound.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Inter-attempt delay.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `op`, retrying transient failures up to the attempt bound.
    ///
    /// # Errors
    ///
    /// Returns the first non-transient error immediately, or the last
    /// transient error once attempts are exhausted.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.attempts => {
                    warn!(
                        attempt,
                        max_attempts = self.attempts,
                        error = %err,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
