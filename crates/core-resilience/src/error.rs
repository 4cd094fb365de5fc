//! Error taxonomy shared by the pool, retry engine, circuit breaker and call wrapper

use thiserror::Error;

/// Failures produced by the resilience layer itself, as opposed to failures
/// reported by the remote service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResilienceError {
    /// No connection became available within the pool's wait bound
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// The pool was closed; no further connections are handed out
    #[error("connection pool is closed")]
    PoolClosed,

    /// The caller's context was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// The call's deadline elapsed
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Dialing or handshaking a new connection failed
    #[error("failed to establish connection: {0}")]
    ConnectionSetup(String),

    /// The breaker for the named operation rejected the call without attempting it
    #[error("circuit breaker is open for {0}")]
    CircuitOpen(String),

    /// A pool or policy setting is out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ResilienceError {
    /// True when the breaker short-circuited the call
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen(_))
    }

    /// True for cancellation and deadline expiry
    pub fn is_context_done(&self) -> bool {
        matches!(
            self,
            ResilienceError::Cancelled | ResilienceError::DeadlineExceeded
        )
    }
}

/// Result of a guarded remote call.
///
/// `Failed` carries the last error the remote operation produced, whether it
/// was terminal or the retries ran out, so callers see the same taxonomy with
/// or without retries.
#[derive(Error, Debug)]
pub enum CallError<E> {
    #[error(transparent)]
    Resilience(#[from] ResilienceError),

    #[error("{0}")]
    Failed(E),
}

impl<E> CallError<E> {
    /// The underlying remote failure, if the call got that far
    pub fn failure(&self) -> Option<&E> {
        match self {
            CallError::Failed(e) => Some(e),
            CallError::Resilience(_) => None,
        }
    }

    pub fn resilience(&self) -> Option<&ResilienceError> {
        match self {
            CallError::Resilience(e) => Some(e),
            CallError::Failed(_) => None,
        }
    }

    pub fn map_failure<F, U>(self, f: F) -> CallError<U>
    where
        F: FnOnce(E) -> U,
    {
        match self {
            CallError::Resilience(e) => CallError::Resilience(e),
            CallError::Failed(e) => CallError::Failed(f(e)),
        }
    }
}

/// Retry classification of a remote failure.
///
/// This is policy supplied by the caller, not a property of the error type:
/// a "not found" answer is terminal while "service unavailable" is retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    Terminal,
}

impl ErrorClass {
    /// Tag an error with this classification
    pub fn tag<E>(self, error: E) -> Failure<E> {
        match self {
            ErrorClass::Retryable => Failure::Retryable(error),
            ErrorClass::Terminal => Failure::Terminal(error),
        }
    }
}

/// A classified failure returned by one attempt inside the retry loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure<E> {
    /// Consumes one attempt; the loop backs off and tries again
    Retryable(E),
    /// Stops the loop immediately
    Terminal(E),
}

impl<E> Failure<E> {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Failure::Retryable(_))
    }

    pub fn into_inner(self) -> E {
        match self {
            Failure::Retryable(e) | Failure::Terminal(e) => e,
        }
    }
}
