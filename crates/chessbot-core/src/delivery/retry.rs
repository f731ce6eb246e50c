//! Bounded retry with Fibonacci backoff for network actions.
//!
//! Every network-facing action (login, join, send, upload) runs through
//! [`RetryPolicy::run`]. The delay after the n-th failed attempt is
//! `base_delay * fib(n)`: with the defaults that is 1s, 1s, 2s, 3s between
//! five attempts.

use std::future::Future;
use std::time::Duration;

use chessbot_types::config::RetrySettings;
use chessbot_types::error::{DeliveryError, TransportError};
use tracing::warn;

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt is allowed after `attempt` (1-based) failed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Backoff after the `attempt`-th failure (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let (mut current, mut next) = (1u32, 1u32);
        for _ in 1..attempt {
            (current, next) = (next, current.saturating_add(next));
        }
        self.base_delay.saturating_mul(current)
    }

    /// Run `op` until it succeeds or the attempts are used up.
    ///
    /// `op` receives the 1-based attempt number. On exhaustion the last
    /// transport error is returned inside [`DeliveryError::RetriesExhausted`].
    pub async fn run<T, F, Fut>(&self, action: &str, mut op: F) -> Result<T, DeliveryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if self.should_retry(attempt) => {
                    let delay = self.delay_for(attempt);
                    warn!(action, attempt, ?delay, %error, "network action failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    return Err(DeliveryError::RetriesExhausted {
                        action: action.to_string(),
                        attempts: attempt,
                        last_error: error,
                    });
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
