//! Generic connection pool for reusable connections
//!
//! Hands out at most `max_active` connections at a time to one backend target,
//! keeps up to `max_idle` of them warm between calls and discards connections
//! that sat idle too long, outlived `max_lifetime` or were marked unhealthy.

use super::context::CallContext;
use super::error::ResilienceError;
use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Configuration for connection pool behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of idle connections kept for reuse
    pub max_idle: usize,
    /// Maximum number of connections checked out at the same time
    pub max_active: usize,
    /// Maximum time a connection can remain idle before being closed
    pub idle_timeout: Option<Duration>,
    /// Maximum lifetime of a connection
    pub max_lifetime: Option<Duration>,
    /// Upper bound on waiting for a free slot, on top of the caller's deadline
    pub wait_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: 10,
            max_active: 20,
            idle_timeout: Some(Duration::from_secs(1)),
            max_lifetime: Some(Duration::from_secs(60 * 60)),
            wait_timeout: None,
        }
    }
}

impl PoolConfig {
    /// Single connection, never expired. Useful for targets that multiplex
    /// internally (one HTTP/2 channel is often enough).
    pub fn single() -> Self {
        Self {
            max_idle: 1,
            max_active: 1,
            idle_timeout: None,
            max_lifetime: None,
            wait_timeout: None,
        }
    }

    pub fn validate(&self) -> Result<(), ResilienceError> {
        if self.max_active == 0 {
            return Err(ResilienceError::InvalidConfig(
                "max_active must be at least 1".to_string(),
            ));
        }
        if self.max_idle > self.max_active {
            return Err(ResilienceError::InvalidConfig(format!(
                "max_idle ({}) cannot exceed max_active ({})",
                self.max_idle, self.max_active
            )));
        }
        Ok(())
    }
}

/// Factory trait for creating and validating connections
#[async_trait::async_trait]
pub trait ConnectionFactory<T: Send + 'static>: Send + Sync {
    /// Dial a new connection. Failures surface as `ConnectionSetup`.
    async fn create(&self) -> Result<T, ResilienceError>;

    /// Check an idle connection before handing it out again
    async fn is_healthy(&self, _conn: &T) -> bool {
        true
    }

    /// Close a connection (optional cleanup)
    fn close(&self, conn: T) {
        drop(conn);
    }
}

/// An idle connection and its bookkeeping
struct IdleConnection<T> {
    conn: T,
    created_at: Instant,
    last_used: Instant,
}

impl<T> IdleConnection<T> {
    fn is_expired(&self, config: &PoolConfig) -> bool {
        if let Some(idle_timeout) = config.idle_timeout {
            if self.last_used.elapsed() > idle_timeout {
                return true;
            }
        }
        outlived(self.created_at, config)
    }
}

fn outlived(created_at: Instant, config: &PoolConfig) -> bool {
    config
        .max_lifetime
        .is_some_and(|max_lifetime| created_at.elapsed() > max_lifetime)
}

/// Internal pool state, guarded by a short-lived mutex. Network I/O never
/// happens while it is held.
struct PoolState<T> {
    idle: VecDeque<IdleConnection<T>>,
    active_count: usize,
    dialed: u64,
    closed: bool,
}

struct PoolInner<T: Send + 'static> {
    config: PoolConfig,
    factory: Arc<dyn ConnectionFactory<T>>,
    state: Mutex<PoolState<T>>,
    semaphore: Arc<Semaphore>,
}

impl<T: Send + 'static> PoolInner<T> {
    fn lock(&self) -> MutexGuard<'_, PoolState<T>> {
        // State stays consistent across a panic in a caller; keep serving.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn put_back(&self, conn: T, created_at: Instant, healthy: bool) {
        let mut state = self.lock();
        state.active_count -= 1;

        let keep = !state.closed
            && healthy
            && !outlived(created_at, &self.config)
            && state.idle.len() < self.config.max_idle;

        if keep {
            state.idle.push_back(IdleConnection {
                conn,
                created_at,
                last_used: Instant::now(),
            });
        } else {
            drop(state);
            debug!(healthy, "Discarding released connection");
            self.factory.close(conn);
        }
    }
}

/// A generic connection pool.
///
/// Cheap to clone; clones share the same connections.
///
/// # Example
/// ```no_run
/// use product_core_resilience::{CallContext, ConnectionFactory, ConnectionPool, PoolConfig, ResilienceError};
/// use std::sync::Arc;
///
/// # #[derive(Clone)]
/// # struct MyConnection { id: usize }
/// struct MyConnectionFactory;
///
/// #[async_trait::async_trait]
/// impl ConnectionFactory<MyConnection> for MyConnectionFactory {
///     async fn create(&self) -> Result<MyConnection, ResilienceError> {
///         Ok(MyConnection { id: 1 })
///     }
/// }
///
/// # async fn example() -> Result<(), ResilienceError> {
/// let pool = ConnectionPool::new(Arc::new(MyConnectionFactory), PoolConfig::default())?;
///
/// let conn = pool.acquire(&CallContext::new()).await?;
/// // Use connection...
/// drop(conn); // back to the idle set
/// # Ok(())
/// # }
/// ```
pub struct ConnectionPool<T: Send + 'static> {
    inner: Arc<PoolInner<T>>,
}

impl<T: Send + 'static> Clone for ConnectionPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> fmt::Debug for ConnectionPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<T: Send + 'static> ConnectionPool<T> {
    /// Create a new connection pool. Connections are dialed lazily.
    pub fn new(
        factory: Arc<dyn ConnectionFactory<T>>,
        config: PoolConfig,
    ) -> Result<Self, ResilienceError> {
        config.validate()?;
        let max_active = config.max_active;
        Ok(Self {
            inner: Arc::new(PoolInner {
                factory,
                state: Mutex::new(PoolState {
                    idle: VecDeque::with_capacity(config.max_idle),
                    active_count: 0,
                    dialed: 0,
                    closed: false,
                }),
                semaphore: Arc::new(Semaphore::new(max_active)),
                config,
            }),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Acquire a connection from the pool
    ///
    /// Reuses the most recently released healthy idle connection, or dials a
    /// new one while under `max_active`. At capacity this waits for a release,
    /// bounded by the context (cancellation, deadline) and `wait_timeout`.
    pub async fn acquire(&self, ctx: &CallContext) -> Result<PooledConnection<T>, ResilienceError> {
        let permit = self.wait_for_slot(ctx).await?;

        loop {
            let candidate = {
                let mut state = self.inner.lock();
                if state.closed {
                    return Err(ResilienceError::PoolClosed);
                }
                state.idle.pop_back()
            };

            let Some(idle) = candidate else { break };

            if idle.is_expired(&self.inner.config) {
                debug!("Closing expired idle connection");
                self.inner.factory.close(idle.conn);
                continue;
            }

            let checked = tokio::select! {
                biased;
                err = ctx.done() => Err(err),
                healthy = self.inner.factory.is_healthy(&idle.conn) => Ok(healthy),
            };
            let healthy = match checked {
                Ok(healthy) => healthy,
                Err(err) => {
                    // Health unknown; leave it for the next caller
                    let mut state = self.inner.lock();
                    if state.closed {
                        drop(state);
                        self.inner.factory.close(idle.conn);
                    } else {
                        state.idle.push_back(idle);
                    }
                    return Err(err);
                }
            };

            if !healthy {
                debug!("Closing unhealthy idle connection");
                self.inner.factory.close(idle.conn);
                continue;
            }

            self.inner.lock().active_count += 1;
            return Ok(PooledConnection::new(
                idle.conn,
                idle.created_at,
                Arc::clone(&self.inner),
                permit,
            ));
        }

        let conn = tokio::select! {
            biased;
            err = ctx.done() => return Err(err),
            created = self.inner.factory.create() => created.map_err(|e| {
                warn!(error = %e, "Failed to create pooled connection");
                e
            })?,
        };

        let mut state = self.inner.lock();
        if state.closed {
            drop(state);
            self.inner.factory.close(conn);
            return Err(ResilienceError::PoolClosed);
        }
        state.active_count += 1;
        state.dialed += 1;
        debug!(dialed = state.dialed, "Dialed new pooled connection");
        drop(state);

        Ok(PooledConnection::new(
            conn,
            Instant::now(),
            Arc::clone(&self.inner),
            permit,
        ))
    }

    async fn wait_for_slot(&self, ctx: &CallContext) -> Result<OwnedSemaphorePermit, ResilienceError> {
        let wait_bound = async {
            match self.inner.config.wait_timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => futures::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            err = ctx.done() => Err(err),
            permit = Arc::clone(&self.inner.semaphore).acquire_owned() => {
                permit.map_err(|_| ResilienceError::PoolClosed)
            }
            _ = wait_bound => Err(ResilienceError::PoolExhausted),
        }
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.lock();
        PoolStats {
            idle: state.idle.len(),
            active: state.active_count,
            dialed: state.dialed,
            max_active: self.inner.config.max_active,
        }
    }

    /// Close all idle connections
    pub fn clear_idle(&self) {
        let idle = std::mem::take(&mut self.inner.lock().idle);
        for pooled in idle {
            self.inner.factory.close(pooled.conn);
        }
    }

    /// Close the pool.
    ///
    /// Idle connections are closed now, checked-out ones when released.
    /// Pending and future `acquire` calls fail with `PoolClosed`.
    pub fn close(&self) {
        let idle = {
            let mut state = self.inner.lock();
            state.closed = true;
            std::mem::take(&mut state.idle)
        };
        self.inner.semaphore.close();
        for pooled in idle {
            self.inner.factory.close(pooled.conn);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

/// A connection checked out of a [`ConnectionPool`].
///
/// Dereferences to the connection. Dropping it returns the connection to the
/// pool, so the slot is released on every exit path, panics included.
pub struct PooledConnection<T: Send + 'static> {
    conn: Option<T>,
    created_at: Instant,
    healthy: bool,
    pool: Arc<PoolInner<T>>,
    // Dropped after `Drop::drop` has returned the connection to the idle set
    _permit: OwnedSemaphorePermit,
}

impl<T: Send + 'static> PooledConnection<T> {
    fn new(
        conn: T,
        created_at: Instant,
        pool: Arc<PoolInner<T>>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            conn: Some(conn),
            created_at,
            healthy: true,
            pool,
            _permit: permit,
        }
    }

    /// Exclude this connection from reuse; it is closed on release
    pub fn mark_unhealthy(&mut self) {
        self.healthy = false;
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    /// Return the connection to the pool now
    pub fn release(self) {
        drop(self);
    }
}

impl<T: Send + 'static> fmt::Debug for PooledConnection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("created_at", &self.created_at)
            .field("healthy", &self.healthy)
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Deref for PooledConnection<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl<T: Send + 'static> DerefMut for PooledConnection<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl<T: Send + 'static> Drop for PooledConnection<T> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put_back(conn, self.created_at, self.healthy);
        }
    }
}

/// Pool statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of idle connections
    pub idle: usize,
    /// Number of connections currently checked out
    pub active: usize,
    /// Connections dialed over the pool's lifetime
    pub dialed: u64,
    /// Maximum concurrently checked-out connections
    pub max_active: usize,
}

impl PoolStats {
    /// Get pool utilization as a percentage
    pub fn utilization(&self) -> f64 {
        if self.max_active == 0 {
            0.0
        } else {
            (self.active as f64 / self.max_active as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug)]
    struct TestConnection {
        id: usize,
    }

    #[derive(Default)]
    struct TestFactory {
        counter: AtomicUsize,
        closed: AtomicUsize,
        fail: AtomicBool,
        stall_health_check: AtomicBool,
    }

    #[async_trait::async_trait]
    impl ConnectionFactory<TestConnection> for TestFactory {
        async fn create(&self) -> Result<TestConnection, ResilienceError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ResilienceError::ConnectionSetup("connection refused".into()));
            }
            let id = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(TestConnection { id })
        }

        async fn is_healthy(&self, _conn: &TestConnection) -> bool {
            if self.stall_health_check.load(Ordering::SeqCst) {
                futures::future::pending::<()>().await;
            }
            true
        }

        fn close(&self, conn: TestConnection) {
            self.closed.fetch_add(1, Ordering::SeqCst);
            drop(conn);
        }
    }

    fn pool_with(config: PoolConfig) -> (Arc<TestFactory>, ConnectionPool<TestConnection>) {
        let factory = Arc::new(TestFactory::default());
        let pool = ConnectionPool::new(factory.clone(), config).unwrap();
        (factory, pool)
    }

    #[tokio::test]
    async fn test_pool_acquire_release() {
        let (_, pool) = pool_with(PoolConfig::default());
        let ctx = CallContext::new();

        let conn1 = pool.acquire(&ctx).await.unwrap();
        assert_eq!(conn1.id, 1);

        let stats = pool.stats();
        assert_eq!(stats.active, 1);
        assert_eq!(stats.idle, 0);

        conn1.release();

        let stats = pool.stats();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.idle, 1);
    }

    #[tokio::test]
    async fn test_pool_reuse() {
        let (factory, pool) = pool_with(PoolConfig::default());
        let ctx = CallContext::new();

        let conn1 = pool.acquire(&ctx).await.unwrap();
        let id1 = conn1.id;
        drop(conn1);

        // Acquire again - should reuse same connection without dialing
        let conn2 = pool.acquire(&ctx).await.unwrap();
        assert_eq!(conn2.id, id1);
        assert_eq!(factory.counter.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().dialed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_discards() {
        let (factory, pool) = pool_with(PoolConfig {
            idle_timeout: Some(Duration::from_millis(100)),
            ..Default::default()
        });
        let ctx = CallContext::new();

        drop(pool.acquire(&ctx).await.unwrap());
        tokio::time::advance(Duration::from_millis(150)).await;

        let conn = pool.acquire(&ctx).await.unwrap();
        assert_eq!(conn.id, 2);
        assert_eq!(factory.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_lifetime_discards_on_release() {
        let (factory, pool) = pool_with(PoolConfig {
            idle_timeout: None,
            max_lifetime: Some(Duration::from_millis(100)),
            ..Default::default()
        });
        let ctx = CallContext::new();

        let conn = pool.acquire(&ctx).await.unwrap();
        tokio::time::advance(Duration::from_millis(150)).await;
        drop(conn);

        assert_eq!(pool.stats().idle, 0);
        assert_eq!(factory.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unhealthy_connection_not_reused() {
        let (_, pool) = pool_with(PoolConfig::default());
        let ctx = CallContext::new();

        let mut conn = pool.acquire(&ctx).await.unwrap();
        conn.mark_unhealthy();
        drop(conn);

        let conn = pool.acquire(&ctx).await.unwrap();
        assert_eq!(conn.id, 2);
    }

    #[tokio::test]
    async fn test_max_idle_caps_idle_set() {
        let (factory, pool) = pool_with(PoolConfig {
            max_idle: 1,
            max_active: 3,
            ..Default::default()
        });
        let ctx = CallContext::new();

        let a = pool.acquire(&ctx).await.unwrap();
        let b = pool.acquire(&ctx).await.unwrap();
        drop(a);
        drop(b);

        assert_eq!(pool.stats().idle, 1);
        assert_eq!(factory.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pool_wait_timeout() {
        let (_, pool) = pool_with(PoolConfig {
            max_idle: 2,
            max_active: 2,
            wait_timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        });
        let ctx = CallContext::new();

        let conn1 = pool.acquire(&ctx).await.unwrap();
        let conn2 = pool.acquire(&ctx).await.unwrap();

        let result = pool.acquire(&ctx).await;
        assert!(matches!(result, Err(ResilienceError::PoolExhausted)));

        drop(conn1);
        let _conn3 = pool.acquire(&ctx).await.unwrap();
        drop(conn2);
    }

    #[tokio::test]
    async fn test_cancel_unblocks_waiting_acquire() {
        let (_, pool) = pool_with(PoolConfig::single());
        let held = pool.acquire(&CallContext::new()).await.unwrap();

        let ctx = CallContext::new();
        let waiter = {
            let pool = pool.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { pool.acquire(&ctx).await.map(|c| c.id) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("acquire must return promptly")
            .unwrap();
        assert_eq!(result, Err(ResilienceError::Cancelled));
        drop(held);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_waiting_acquire() {
        let (_, pool) = pool_with(PoolConfig::single());
        let _held = pool.acquire(&CallContext::new()).await.unwrap();

        let ctx = CallContext::new().with_timeout(Duration::from_millis(30));
        let result = pool.acquire(&ctx).await;
        assert!(matches!(result, Err(ResilienceError::DeadlineExceeded)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_idle_health_check() {
        let (factory, pool) = pool_with(PoolConfig::default());
        drop(pool.acquire(&CallContext::new()).await.unwrap());
        factory.stall_health_check.store(true, Ordering::SeqCst);

        let ctx = CallContext::new().with_timeout(Duration::from_millis(30));
        let result = pool.acquire(&ctx).await;
        assert!(matches!(result, Err(ResilienceError::DeadlineExceeded)));

        // The idle connection stays pooled and the slot is free again
        let stats = pool.stats();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.active, 0);
        assert_eq!(factory.closed.load(Ordering::SeqCst), 0);

        factory.stall_health_check.store(false, Ordering::SeqCst);
        let conn = pool.acquire(&CallContext::new()).await.unwrap();
        assert_eq!(conn.id, 1);
    }

    #[tokio::test]
    async fn test_setup_failure_releases_slot() {
        let (factory, pool) = pool_with(PoolConfig::single());
        let ctx = CallContext::new();

        factory.fail.store(true, Ordering::SeqCst);
        let result = pool.acquire(&ctx).await;
        assert!(matches!(result, Err(ResilienceError::ConnectionSetup(_))));

        factory.fail.store(false, Ordering::SeqCst);
        let conn = pool.acquire(&ctx).await.unwrap();
        assert_eq!(conn.id, 1);
    }

    #[tokio::test]
    async fn test_close_rejects_acquire() {
        let (factory, pool) = pool_with(PoolConfig::default());
        let ctx = CallContext::new();

        drop(pool.acquire(&ctx).await.unwrap());
        let in_flight = pool.acquire(&ctx).await.unwrap();
        pool.close();

        assert!(matches!(pool.acquire(&ctx).await, Err(ResilienceError::PoolClosed)));

        // Checked-out connection is closed once it comes back
        drop(in_flight);
        assert_eq!(pool.stats().idle, 0);
        assert_eq!(factory.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_acquire_never_exceeds_max_active() {
        let (_, pool) = pool_with(PoolConfig {
            max_idle: 3,
            max_active: 3,
            ..Default::default()
        });
        let outstanding = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..40 {
            let pool = pool.clone();
            let outstanding = outstanding.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let conn = pool.acquire(&CallContext::new()).await.unwrap();
                let now = outstanding.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                outstanding.fetch_sub(1, Ordering::SeqCst);
                drop(conn);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(pool.stats().dialed <= 3);
    }

    #[tokio::test]
    async fn test_waiting_acquire_wakes_on_release() {
        let (factory, pool) = pool_with(PoolConfig::single());
        let ctx = CallContext::new();

        let held = pool.acquire(&ctx).await.unwrap();
        let mut waiting = tokio_test::task::spawn(pool.acquire(&ctx));
        tokio_test::assert_pending!(waiting.poll());

        drop(held);
        assert!(waiting.is_woken());
        let conn = tokio_test::assert_ready_ok!(waiting.poll());
        assert_eq!(conn.id, 1);
        assert_eq!(factory.counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_config_validation() {
        let config = PoolConfig {
            max_active: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PoolConfig {
            max_idle: 5,
            max_active: 2,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(PoolConfig::single().validate().is_ok());
    }
}
