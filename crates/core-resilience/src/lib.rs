//! Product Core Resilience: Pure-logic fault tolerance for outbound calls
//!
//! # Overview
//!
//! This crate provides the building blocks every outbound client of the
//! product service is assembled from:
//!
//! - **Connection Pool**: Bounded reuse of expensive connections with idle/lifetime expiry
//! - **Retry Engine**: Bounded attempts with exponential backoff, interruptible by cancellation
//! - **Circuit Breaker**: Per-operation fail-fast once a dependency keeps failing
//! - **Resilient Call Wrapper**: Timeout, breaker and retry composed around one unary call
//!
//! # Key Principles
//!
//! This crate is **pure logic** with zero knowledge of:
//! - Network protocols (gRPC, HTTP)
//! - Remote error codes (callers classify their own failures)
//! - Application-specific concerns
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Typed Client Facade             │
//! └─────────────┬───────────────────────────┘
//!               │  CallContext (cancel, deadline, caller)
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Resilient Call Wrapper            │  ← Overall timeout
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Circuit Breaker (per method)      │  ← Fail-fast protection
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Retry Engine                      │  ← Exponential backoff
//! └─────────────┬───────────────────────────┘
//!               │  each attempt
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Connection Pool                   │  ← Resource efficiency
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//!         Remote Service
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use product_core_resilience::{CallContext, CallPolicy, ErrorClass, ResilientCaller};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let caller = ResilientCaller::new(CallPolicy {
//!     timeout: Duration::from_millis(500),
//!     retry_count: 3,
//!     retry_interval: Duration::from_millis(20),
//!     use_circuit_breaker: true,
//! });
//!
//! let result = caller
//!     .invoke(
//!         &CallContext::new(),
//!         "FindByProductID",
//!         |_e: &String| ErrorClass::Retryable,
//!         |_ctx| async { Ok::<_, String>(42) },
//!     )
//!     .await;
//! # let _ = result;
//! # }
//! ```

pub mod call;
pub mod circuit_breaker;
pub mod connection_pool;
pub mod context;
pub mod error;
pub mod retry;

// Re-export main types for convenience
pub use call::{CallPolicy, ResilientCaller};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState,
};
pub use connection_pool::{
    ConnectionFactory, ConnectionPool, PoolConfig, PoolStats, PooledConnection,
};
pub use context::CallContext;
pub use error::{CallError, ErrorClass, Failure, ResilienceError};
pub use retry::{retry, Backoff, RetryPolicy};

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use product_core_resilience::prelude::*;
/// ```
pub mod prelude {
    pub use super::call::{CallPolicy, ResilientCaller};
    pub use super::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerRegistry};
    pub use super::connection_pool::{ConnectionFactory, ConnectionPool, PoolConfig};
    pub use super::context::CallContext;
    pub use super::error::{CallError, ErrorClass, ResilienceError};
}
