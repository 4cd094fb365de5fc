//! Bounded retry with exponential backoff
//!
//! The operation decides what is worth retrying by tagging its failures as
//! [`Failure::Retryable`] or [`Failure::Terminal`]. Backoff sleeps race the
//! caller's cancellation token so a caller that gives up is not kept waiting.

use super::error::{CallError, Failure, ResilienceError};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How many times to run an operation and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts. `0` and `1` both mean "try once, no retry".
    pub attempts: u32,
    /// Delay before the second attempt; doubled before each further one
    pub base_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 1,
            base_interval: Duration::from_millis(20),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_interval: Duration) -> Self {
        Self {
            attempts,
            base_interval,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.attempts.max(1)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.base_interval)
    }
}

/// Exponential backoff schedule: `base, 2*base, 4*base, ...`, saturating
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
}

impl Backoff {
    pub fn new(base: Duration) -> Self {
        Self { next: base }
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        self.next = current.checked_mul(2).unwrap_or(Duration::MAX);
        Some(current)
    }
}

/// Run `op` until it succeeds, fails terminally or runs out of attempts.
///
/// A terminal failure is returned straight away. When attempts run out the
/// last retryable error is returned. Cancelling `cancel` during a backoff
/// sleep returns [`ResilienceError::Cancelled`] immediately.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, CallError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Failure<E>>>,
{
    let max_attempts = policy.max_attempts();
    let mut backoff = policy.backoff();
    let mut attempt = 0;

    loop {
        attempt += 1;

        let error = match op().await {
            Ok(value) => return Ok(value),
            Err(Failure::Terminal(e)) => return Err(CallError::Failed(e)),
            Err(Failure::Retryable(e)) => e,
        };

        if attempt >= max_attempts {
            return Err(CallError::Failed(error));
        }

        let delay = backoff.next().unwrap_or(policy.base_interval);
        debug!(attempt, max_attempts, ?delay, "Retryable failure, backing off");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ResilienceError::Cancelled.into()),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
