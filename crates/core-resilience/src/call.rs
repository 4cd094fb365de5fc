//! Resilient Call Wrapper: timeout, circuit breaker and retry around one unary call
//!
//! ```text
//!   invoke(ctx, method, classify, op)
//!     │
//!     ├─ child context: deadline = min(ctx deadline, now + policy.timeout)
//!     │   (cancelled on every exit path)
//!     │
//!     ├─ circuit breaker for `method`   (only if use_circuit_breaker)
//!     │     │
//!     │     └─ deadline / cancellation race
//!     │           │
//!     │           └─ retry(retry_count, retry_interval)
//!     │                 └─ op(&child)  ← one network attempt, classified
//!     ▼
//!   Ok(T) | CallError::Failed(last E) | CallError::Resilience(..)
//! ```

use super::circuit_breaker::CircuitBreakerRegistry;
use super::context::CallContext;
use super::error::{CallError, ErrorClass, ResilienceError};
use super::retry::{retry, RetryPolicy};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Timeout, retry and breaker settings applied to every call of one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallPolicy {
    /// Budget for the whole call, retries and backoff included
    pub timeout: Duration,
    /// Total attempts; `0` and `1` mean no retry
    pub retry_count: u32,
    /// Base backoff, doubled after every retryable failure
    pub retry_interval: Duration,
    /// Guard calls with a per-method circuit breaker
    pub use_circuit_breaker: bool,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            retry_count: 0,
            retry_interval: Duration::from_millis(20),
            use_circuit_breaker: false,
        }
    }
}

impl CallPolicy {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_count, self.retry_interval)
    }

    pub fn validate(&self) -> Result<(), ResilienceError> {
        if self.timeout.is_zero() {
            return Err(ResilienceError::InvalidConfig(
                "call timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Composes [`CallContext`] deadlines, [`CircuitBreakerRegistry`] and
/// [`retry`] into a single "invoke remote unary operation" primitive.
///
/// Cheap to clone; clones share breaker state.
#[derive(Debug, Clone)]
pub struct ResilientCaller {
    policy: Arc<CallPolicy>,
    breakers: CircuitBreakerRegistry,
}

impl ResilientCaller {
    pub fn new(policy: CallPolicy) -> Self {
        Self::with_breakers(policy, CircuitBreakerRegistry::default())
    }

    pub fn with_breakers(policy: CallPolicy, breakers: CircuitBreakerRegistry) -> Self {
        Self {
            policy: Arc::new(policy),
            breakers,
        }
    }

    pub fn policy(&self) -> &CallPolicy {
        &self.policy
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    /// Invoke `op` under this caller's policy.
    ///
    /// `op` performs one network attempt and receives the call's child
    /// context; transports copy [`CallContext::caller`] into outgoing
    /// metadata and may derive a wire timeout from
    /// [`CallContext::remaining`]. `classify` decides which failures are
    /// retried; only retryable failures and deadline expiry count against the
    /// circuit breaker.
    pub async fn invoke<T, E, F, Fut, C>(
        &self,
        ctx: &CallContext,
        method: &str,
        classify: C,
        mut op: F,
    ) -> Result<T, CallError<E>>
    where
        F: FnMut(&CallContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> ErrorClass,
        E: fmt::Display,
    {
        let call_ctx = ctx.child_with_timeout(self.policy.timeout);
        let _cancel_on_exit = call_ctx.token().clone().drop_guard();
        let retry_policy = self.policy.retry_policy();

        let classify = &classify;
        let op = &mut op;
        let attempt_ctx = &call_ctx;

        let bounded = async {
            tokio::select! {
                biased;
                err = call_ctx.done() => Err(CallError::Resilience(err)),
                result = retry(&retry_policy, call_ctx.token(), move || {
                    let attempt = op(attempt_ctx);
                    async move { attempt.await.map_err(|e| classify(&e).tag(e)) }
                }) => result,
            }
        };

        let result = if self.policy.use_circuit_breaker {
            let trips = |e: &CallError<E>| match e {
                CallError::Failed(inner) => classify(inner) == ErrorClass::Retryable,
                CallError::Resilience(err) => *err == ResilienceError::DeadlineExceeded,
            };
            self.breakers.guard(method, || bounded, trips).await
        } else {
            bounded.await
        };

        match &result {
            Ok(_) => debug!(method, caller = ctx.caller(), "Remote call succeeded"),
            Err(e) => warn!(method, caller = ctx.caller(), error = %e, "Remote call failed"),
        }

        result
    }
}
