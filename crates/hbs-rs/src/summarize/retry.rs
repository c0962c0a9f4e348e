//! Backoff for summarizer calls.
//!
//! Only errors that [`HbsError::is_transient`](crate::HbsError::is_transient)
//! accepts are retried (HTTP 429/5xx, timeouts, dropped connections). A
//! missing backend, an empty summary, or any other 4xx goes straight back to
//! the caller.

use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Exponential backoff schedule.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Extra attempts after the first. `0` disables retrying.
    pub max_retries: u32,
    /// Wait before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single wait.
    pub max_delay: Duration,
    pub factor: f64,
    /// Shorten each wait by a fixed per-attempt fraction.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn with_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Wait before retry number `attempt + 1`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = (self.base_delay.as_secs_f64() * self.factor.powi(exp))
            .min(self.max_delay.as_secs_f64());
        let scale = if self.jitter {
            // 1.0, 0.85, 0.7, 0.55, then repeat
            1.0 - 0.15 * f64::from(attempt % 4)
        } else {
            1.0
        };
        Duration::from_secs_f64(secs * scale)
    }

    /// Await `op`, calling it again after a transient failure until the
    /// retry allowance runs out. The last error is returned.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            if attempt >= self.max_retries || !err.is_transient() {
                return Err(err);
            }
            let delay = self.delay_for_attempt(attempt);
            attempt += 1;
            warn!(
                attempt,
                max_retries = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                "summarizer call failed, retrying: {err}"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
