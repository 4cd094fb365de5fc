//! Per-call cancellation, deadline and caller identity
//!
//! Every blocking point in this crate (pool waits, backoff sleeps, in-flight
//! calls) races against a [`CallContext`], so cancelling the caller's token or
//! letting its deadline pass unblocks the call promptly.

use crate::error::ResilienceError;
use std::borrow::Cow;
use std::panic::Location;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation scope for one logical call
#[derive(Debug, Clone)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    caller: Cow<'static, str>,
}

impl CallContext {
    /// Create a context with no deadline.
    ///
    /// The caller identity defaults to the source location that created the
    /// context, which is what ends up in the outgoing `caller` metadata.
    #[track_caller]
    pub fn new() -> Self {
        let location = Location::caller();
        Self {
            cancel: CancellationToken::new(),
            deadline: None,
            caller: Cow::Owned(format!("{}:{}", location.file(), location.line())),
        }
    }

    /// Use an existing token, e.g. one owned by a server request or shutdown signal
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Override the caller identity with a logical name
    pub fn with_caller(mut self, caller: impl Into<Cow<'static, str>>) -> Self {
        self.caller = caller.into();
        self
    }

    /// Derive a child bounded by `timeout`.
    ///
    /// The child is cancelled whenever the parent is, and its deadline never
    /// extends past the parent's.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let own = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent < own => parent,
            _ => own,
        };
        Self {
            cancel: self.cancel.child_token(),
            deadline: Some(deadline),
            caller: self.caller.clone(),
        }
    }

    pub fn caller(&self) -> &str {
        &self.caller
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolve once the context is finished, reporting why
    pub async fn done(&self) -> ResilienceError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => ResilienceError::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => ResilienceError::DeadlineExceeded,
                }
            }
            None => {
                self.cancel.cancelled().await;
                ResilienceError::Cancelled
            }
        }
    }
}
