//! Bounded exponential backoff with jitter

use super::ApiError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry settings for control-plane calls
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Each delay is scaled by a random factor in `1 - jitter ..= 1 + jitter`
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter: 0.5,
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the given failed attempt (1-based),
    /// without jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let delay = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    /// Jittered delay before retrying after the given failed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter = self.jitter.clamp(0.0, 1.0);
        let factor = if jitter > 0.0 {
            rand::thread_rng().gen_range(1.0 - jitter..=1.0 + jitter)
        } else {
            1.0
        };
        self.base_delay(attempt).mul_f64(factor)
    }

    /// Run `operation` until it succeeds or the attempts are used up
    pub async fn retry_with_backoff<T, F, Fut>(
        &self,
        operation_name: &str,
        mut operation: F,
    ) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!(operation = operation_name, attempt, max_attempts, "Calling control plane");
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= max_attempts => {
                    return Err(ApiError::RetryExhausted {
                        operation: operation_name.to_string(),
                        attempts: attempt,
                        last_error: Box::new(e),
                    });
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation = operation_name,
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Control plane call failed, retrying..."
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
