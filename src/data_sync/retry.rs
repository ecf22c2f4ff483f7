use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    Fixed,
    Exponential { factor: u32, max_delay_ms: u64 },
}

/// Bounded retry schedule for remote calls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 5, initial_delay_ms: 500, backoff: Backoff::Exponential { factor: 2, max_delay_ms: 5_000 } }
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, initial_delay_ms: delay.as_millis() as u64, backoff: Backoff::Fixed }
    }

    /// Delay slept after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let initial = self.initial_delay_ms;
        let ms = match self.backoff {
            Backoff::Fixed => initial,
            Backoff::Exponential { factor, max_delay_ms } => {
                let exp = attempt.saturating_sub(1);
                let scaled = (factor as u64).checked_pow(exp).and_then(|mul| initial.checked_mul(mul)).unwrap_or(u64::MAX);
                scaled.min(max_delay_ms)
            }
        };
        Duration::from_millis(ms)
    }
}

/// Run `op` until it succeeds or `policy.max_attempts` attempts have failed.
///
/// A policy with `max_attempts == 0` still makes one attempt.
pub async fn retry_with_backoff<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, RetryError<E>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= max_attempts => {
                error!(%label, attempts = attempt, "Retries exhausted: {}", err);
                return Err(RetryError::Exhausted { attempts: attempt, last: err });
            }
            Err(err) => {
                let delay = policy.delay_after(attempt);
                warn!(%label, attempt, ?delay, "Attempt failed, retrying: {}", err);
                sleep(delay).await;
            }
        }
    }
}
