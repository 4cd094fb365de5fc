//! Circuit Breaker implementation for fault tolerance
//!
//! The circuit breaker prevents cascading failures by failing fast when a service
//! is experiencing issues. It has three states:
//! - Closed: Normal operation, requests pass through
//! - Open: Service is unhealthy, requests fail immediately
//! - HalfOpen: One trial request decides between Closed and Open
//!
//! [`CircuitBreakerRegistry`] keeps one breaker per operation name, so
//! different RPC methods to the same backend trip independently.

use super::error::ResilienceError;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// State of the circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests pass through normally
    Closed,
    /// Circuit is open, requests fail immediately
    /// Next probe time indicates when to try half-open
    Open { next_probe: Instant },
    /// Circuit is half-open, testing service recovery
    HalfOpen,
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: usize,
    /// Number of successful trial calls in half-open to close circuit
    pub success_threshold: usize,
    /// Duration to wait before transitioning from open to half-open
    pub cooldown: Duration,
    /// A failure streak older than this starts over instead of accumulating
    pub failure_window: Option<Duration>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 1,
            cooldown: Duration::from_secs(5),
            failure_window: Some(Duration::from_secs(10)),
        }
    }
}

/// Internal state of the circuit breaker
#[derive(Debug)]
struct CircuitBreakerState {
    /// Current state of the circuit
    state: CircuitState,
    /// Consecutive failure count
    consecutive_failures: usize,
    /// When the current failure streak began
    streak_started: Option<Instant>,
    /// Consecutive success count (used in half-open state)
    consecutive_successes: usize,
    /// A half-open trial call is in flight
    probing: bool,
}

impl CircuitBreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            streak_started: None,
            consecutive_successes: 0,
            probing: false,
        }
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.streak_started = None;
        self.consecutive_successes = 0;
        self.probing = false;
    }

    fn open(&mut self, cooldown: Duration) {
        self.state = CircuitState::Open {
            next_probe: Instant::now() + cooldown,
        };
        self.consecutive_failures = 0;
        self.streak_started = None;
        self.consecutive_successes = 0;
        self.probing = false;
    }
}

/// Admission ticket for one call. Clears the half-open probe flag if the call
/// is dropped before reporting an outcome.
struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if self.probe && !self.settled {
            self.breaker.lock().probing = false;
        }
    }
}

/// Circuit breaker for protecting against cascading failures
///
/// # Example
/// ```no_run
/// use product_core_resilience::{CircuitBreaker, CircuitBreakerConfig, ResilienceError};
///
/// #[tokio::main]
/// async fn main() -> Result<(), ResilienceError> {
///     let breaker = CircuitBreaker::new("FindByProductID", CircuitBreakerConfig::default());
///
///     // Every error counts against the breaker here
///     let result = breaker
///         .call(|| async { Ok::<_, ResilienceError>(42) }, |_| true)
///         .await?;
///
///     println!("Result: {}", result);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    config: Arc<CircuitBreakerConfig>,
    state: Arc<Mutex<CircuitBreakerState>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(name: impl Into<Arc<str>>, config: CircuitBreakerConfig) -> Self {
        Self::with_shared_config(name.into(), Arc::new(config))
    }

    fn with_shared_config(name: Arc<str>, config: Arc<CircuitBreakerConfig>) -> Self {
        Self {
            name,
            config,
            state: Arc::new(Mutex::new(CircuitBreakerState::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CircuitBreakerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current state of the circuit breaker
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Get current failure count
    pub fn failure_count(&self) -> usize {
        self.lock().consecutive_failures
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        self.lock().close();
    }

    /// Execute an operation with circuit breaker protection.
    ///
    /// When the circuit is open the operation is not invoked and the call
    /// fails with [`ResilienceError::CircuitOpen`]. Otherwise the operation
    /// runs and its outcome updates the breaker: `trips` decides which errors
    /// count as backend failures; the rest leave the failure streak alone.
    pub async fn call<F, Fut, T, E, P>(&self, op: F, trips: P) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<ResilienceError>,
        P: FnOnce(&E) -> bool,
    {
        let mut admission = self.admit().map_err(E::from)?;

        let result = op().await;
        admission.settled = true;

        match &result {
            Ok(_) => self.on_success(),
            Err(e) => {
                if trips(e) {
                    self.on_failure();
                } else {
                    self.on_neutral();
                }
            }
        }

        result
    }

    /// Check circuit state and update if necessary
    fn admit(&self) -> Result<Admission<'_>, ResilienceError> {
        let mut state = self.lock();

        let probe = match state.state {
            CircuitState::Closed => false,
            CircuitState::Open { next_probe } => {
                if Instant::now() >= next_probe {
                    // Transition to half-open for testing
                    state.state = CircuitState::HalfOpen;
                    state.consecutive_successes = 0;
                    state.probing = true;
                    true
                } else {
                    return Err(ResilienceError::CircuitOpen(self.name.to_string()));
                }
            }
            CircuitState::HalfOpen => {
                if state.probing {
                    return Err(ResilienceError::CircuitOpen(self.name.to_string()));
                }
                state.probing = true;
                true
            }
        };

        Ok(Admission {
            breaker: self,
            probe,
            settled: false,
        })
    }

    /// Handle successful operation
    fn on_success(&self) {
        let mut state = self.lock();

        match state.state {
            CircuitState::Closed => {
                // Reset failure count on success
                state.consecutive_failures = 0;
                state.streak_started = None;
            }
            CircuitState::HalfOpen => {
                state.consecutive_successes += 1;
                state.probing = false;

                if state.consecutive_successes >= self.config.success_threshold {
                    state.close();
                    info!(operation = %self.name, "Circuit closed");
                }
            }
            CircuitState::Open { .. } => {
                // A call admitted before the circuit opened; nothing to learn
            }
        }
    }

    /// Handle failed operation
    fn on_failure(&self) {
        let mut state = self.lock();

        match state.state {
            CircuitState::Closed => {
                let now = Instant::now();
                let stale = match (state.streak_started, self.config.failure_window) {
                    (Some(started), Some(window)) => now.duration_since(started) > window,
                    _ => false,
                };
                if stale || state.streak_started.is_none() {
                    state.streak_started = Some(now);
                    state.consecutive_failures = 0;
                }
                state.consecutive_failures += 1;

                if state.consecutive_failures >= self.config.failure_threshold {
                    state.open(self.config.cooldown);
                    warn!(
                        operation = %self.name,
                        cooldown = ?self.config.cooldown,
                        "Circuit opened after consecutive failures"
                    );
                }
            }
            CircuitState::HalfOpen => {
                // Any failure in half-open state reopens the circuit
                state.open(self.config.cooldown);
                warn!(operation = %self.name, "Trial call failed, circuit reopened");
            }
            CircuitState::Open { .. } => {
                // Already open, nothing to do
            }
        }
    }

    /// The backend answered, but with an error that says nothing about its health
    fn on_neutral(&self) {
        let mut state = self.lock();
        if state.state == CircuitState::HalfOpen {
            state.probing = false;
        }
    }
}

/// One breaker per logical operation, created on first use
#[derive(Debug, Clone)]
pub struct CircuitBreakerRegistry {
    config: Arc<CircuitBreakerConfig>,
    breakers: Arc<Mutex<HashMap<String, CircuitBreaker>>>,
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config: Arc::new(config),
            breakers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Breaker for `operation`, shared by every caller of that operation
    pub fn get(&self, operation: &str) -> CircuitBreaker {
        let mut breakers = self
            .breakers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        breakers
            .entry(operation.to_string())
            .or_insert_with(|| {
                CircuitBreaker::with_shared_config(Arc::from(operation), Arc::clone(&self.config))
            })
            .clone()
    }

    /// Run `op` guarded by the breaker for `operation`
    pub async fn guard<F, Fut, T, E, P>(&self, operation: &str, op: F, trips: P) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<ResilienceError>,
        P: FnOnce(&E) -> bool,
    {
        self.get(operation).call(op, trips).await
    }

    /// Current state for `operation`; unknown operations are closed
    pub fn state(&self, operation: &str) -> CircuitState {
        self.get(operation).state()
    }

    pub fn reset(&self, operation: &str) {
        self.get(operation).reset();
    }
}
