//! Connection pool implementation.
//!
//! The pool keeps two lists under a single lock: idle handles ready for
//! reuse and active handles in checkout order. Acquiring prefers an idle
//! connection, then opens a new one while below `max_active`, then reclaims
//! the oldest active connection if its handle was abandoned without being
//! returned, and otherwise sleeps on a condition variable until a release
//! (or `time_to_wait`) wakes it to look again.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};
use sqlpool_driver::DriverManager;

use crate::config::PoolConfig;
use crate::connection::{ConnectionHandle, PooledConnection, RawConnection};
use crate::error::{PoolError, Result};
use crate::registry::DriverRegistry;
use crate::state::PoolState;

/// A pooled data source.
///
/// Hands out [`PooledConnection`]s that go back to the pool when closed or
/// dropped. Cloning is cheap; all clones share one pool.
///
/// # Example
///
/// ```rust,ignore
/// use sqlpool::{Connection, PoolConfig, PooledDataSource};
///
/// let pool = PooledDataSource::builder()
///     .driver("postgres")
///     .url("postgres://localhost/app")
///     .username("app")
///     .password("secret")
///     .max_active(8)
///     .build()?;
///
/// let mut conn = pool.get_connection()?;
/// conn.execute("UPDATE jobs SET state = 'done' WHERE id = 1")?;
/// conn.close()?; // back to the pool, not closed
/// ```
#[derive(Clone)]
pub struct PooledDataSource {
    inner: Arc<PoolInner>,
}

pub(crate) struct PoolInner {
    /// Pool configuration.
    config: PoolConfig,

    /// Idle and active handles.
    state: Mutex<PoolState>,

    /// Signalled whenever a connection goes back or a slot frees up.
    available: Condvar,

    /// Whether the pool is closed.
    closed: AtomicBool,

    /// Counter for raw connection IDs.
    next_connection_id: AtomicU64,

    /// Counter for handle IDs.
    next_handle_id: AtomicU64,

    /// Process-wide driver registration cache.
    registry: &'static DriverRegistry,
}

impl PooledDataSource {
    /// Create a new pool builder.
    #[must_use]
    pub fn builder() -> PooledDataSourceBuilder {
        PooledDataSourceBuilder::new()
    }

    /// Create a new pool with the given configuration.
    ///
    /// No connections are opened until the first acquire.
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;

        tracing::info!(
            driver = %config.driver,
            max_active = config.max_active,
            max_idle = config.max_idle,
            time_to_wait_ms = millis(config.time_to_wait),
            "connection pool created"
        );

        let inner = Arc::new(PoolInner {
            config,
            state: Mutex::new(PoolState::default()),
            available: Condvar::new(),
            closed: AtomicBool::new(false),
            next_connection_id: AtomicU64::new(1),
            next_handle_id: AtomicU64::new(1),
            registry: DriverRegistry::global(),
        });

        Ok(Self { inner })
    }

    /// Get a connection using the configured credentials.
    ///
    /// Blocks while every connection is checked out. Waiting is never
    /// turned into a timeout error; the pool re-checks every
    /// `time_to_wait` until a connection frees up or the pool is closed.
    pub fn get_connection(&self) -> Result<PooledConnection> {
        let config = &self.inner.config;
        self.get_connection_with(&config.username, &config.password)
    }

    /// Get a connection, opening new ones with the given credentials.
    pub fn get_connection_with(&self, user: &str, password: &str) -> Result<PooledConnection> {
        let handle = self.inner.acquire(user, password, None)?;
        Ok(PooledConnection::new(handle, Arc::downgrade(&self.inner)))
    }

    /// Like [`get_connection_with`](Self::get_connection_with), but gives
    /// up with [`PoolError::AcquireInterrupted`] once `cancel` fires.
    ///
    /// `cancel` must come from this pool's [`cancel_token`](Self::cancel_token);
    /// a token issued by another pool cannot wake this pool's waiters and is
    /// rejected with [`PoolError::Config`].
    pub fn get_connection_cancellable(
        &self,
        user: &str,
        password: &str,
        cancel: &CancelToken,
    ) -> Result<PooledConnection> {
        if !Weak::ptr_eq(&cancel.pool, &Arc::downgrade(&self.inner)) {
            return Err(PoolError::Config(
                "cancel token was issued by a different pool".to_string(),
            ));
        }
        let handle = self.inner.acquire(user, password, Some(cancel))?;
        Ok(PooledConnection::new(handle, Arc::downgrade(&self.inner)))
    }

    /// Create a token that can interrupt acquires blocked on this pool.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        CancelToken {
            cancelled: Arc::new(AtomicBool::new(false)),
            pool: Arc::downgrade(&self.inner),
        }
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            idle: state.idle.len(),
            active: state.active.len(),
            max_active: self.inner.config.max_active,
            max_idle: self.inner.config.max_idle,
        }
    }

    /// Close the pool.
    ///
    /// Idle connections are closed immediately, blocked acquires fail with
    /// [`PoolError::PoolClosed`], and connections still checked out are
    /// closed when they are returned.
    pub fn close(&self) {
        let idle: Vec<_> = {
            let mut state = self.inner.state.lock();
            self.inner.closed.store(true, Ordering::Release);
            self.inner.available.notify_all();
            state.idle.drain(..).collect()
        };

        for handle in idle {
            if let Err(e) = handle.raw.close() {
                tracing::warn!(
                    connection_id = handle.raw.id,
                    error = %e,
                    "failed to close idle connection"
                );
            }
        }
        tracing::info!("connection pool closed");
    }

    /// Check if the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for PooledDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledDataSource")
            .field("config", &self.inner.config)
            .field("status", &self.status())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl PoolInner {
    fn acquire(
        &self,
        user: &str,
        password: &str,
        cancel: Option<&CancelToken>,
    ) -> Result<Arc<ConnectionHandle>> {
        self.registry.ensure_registered(&self.config.driver)?;

        let mut state = self.state.lock();
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(PoolError::PoolClosed);
            }
            if cancel.is_some_and(CancelToken::is_cancelled) {
                tracing::debug!("connection acquisition interrupted");
                return Err(PoolError::AcquireInterrupted);
            }

            let handle = if let Some(handle) = state.idle.pop_front() {
                tracing::debug!(connection_id = handle.raw.id, "reusing idle connection");
                handle
            } else if state.active.len() < self.config.max_active {
                let raw = self.open_raw(user, password)?;
                self.wrap(raw)
            } else {
                let oldest = Arc::clone(&state.active[0]);
                if oldest.is_in_use() {
                    self.wait(&mut state);
                    continue;
                }

                tracing::warn!(
                    connection_id = oldest.raw.id,
                    handle_id = oldest.id,
                    "reclaiming active connection whose handle is no longer in use"
                );
                state.remove_active(&oldest);
                self.wrap(Arc::clone(&oldest.raw))
            };

            if !handle.is_in_use() {
                if let Err(e) = handle.raw.rollback_if_needed() {
                    // The handle is in neither list; drop the connection.
                    self.discard(&handle.raw);
                    self.available.notify_all();
                    return Err(e.into());
                }
                state.active.push(Arc::clone(&handle));
            }
            handle.set_in_use(true);

            tracing::trace!(
                connection_id = handle.raw.id,
                handle_id = handle.id,
                active = state.active.len(),
                idle = state.idle.len(),
                "connection checked out"
            );
            return Ok(handle);
        }
    }

    fn wait(&self, state: &mut MutexGuard<'_, PoolState>) {
        tracing::trace!(
            active = state.active.len(),
            wait_ms = millis(self.config.time_to_wait),
            "pool exhausted, waiting for a connection"
        );
        if self.config.time_to_wait == Duration::ZERO {
            self.available.wait(state);
        } else {
            self.available.wait_for(state, self.config.time_to_wait);
        }
    }

    /// Put a returned handle's connection back, or close it.
    pub(crate) fn release(&self, handle: &Arc<ConnectionHandle>) -> Result<()> {
        let mut state = self.state.lock();
        if !state.remove_active(handle) {
            return Ok(());
        }

        let keep = !self.closed.load(Ordering::Acquire) && state.idle.len() < self.config.max_idle;
        let rolled_back = handle.raw.rollback_if_needed();

        if keep && rolled_back.is_ok() {
            let fresh = self.wrap(Arc::clone(&handle.raw));
            tracing::debug!(
                connection_id = fresh.raw.id,
                handle_id = fresh.id,
                "connection returned to idle pool"
            );
            state.idle.push_back(fresh);
            self.available.notify_all();
            return Ok(());
        }

        let closed = handle.raw.close();
        // Active shrank, so a waiter may now open a connection.
        self.available.notify_all();
        drop(state);

        rolled_back?;
        closed?;
        Ok(())
    }

    fn open_raw(&self, user: &str, password: &str) -> Result<Arc<RawConnection>> {
        self.registry.ensure_registered(&self.config.driver)?;
        let conn = DriverManager::global().connect(&self.config.url, user, password)?;
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(connection_id = id, url = %self.config.url, "opened new connection");
        Ok(Arc::new(RawConnection::new(id, conn)))
    }

    fn wrap(&self, raw: Arc<RawConnection>) -> Arc<ConnectionHandle> {
        let id = self.next_handle_id.fetch_add(1, Ordering::Relaxed);
        Arc::new(ConnectionHandle::new(id, raw))
    }

    fn discard(&self, raw: &RawConnection) {
        if let Err(e) = raw.close() {
            tracing::warn!(connection_id = raw.id, error = %e, "failed to close connection");
        }
    }
}

/// Milliseconds for log fields, saturating at `u64::MAX`.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        let idle: Vec<_> = self.state.get_mut().idle.drain(..).collect();
        for handle in idle {
            self.discard(&handle.raw);
        }
    }
}

/// Interrupts acquires blocked on one pool.
///
/// Obtained from [`PooledDataSource::cancel_token`]. Cancelling is
/// permanent; create a new token for the next attempt.
#[derive(Debug, Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    pool: Weak<PoolInner>,
}

impl CancelToken {
    /// Cancel, waking every acquire waiting on the pool.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(pool) = self.pool.upgrade() {
            // Taking the lock orders this wake-up after any waiter's check.
            let _state = pool.state.lock();
            pool.available.notify_all();
        }
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Builder for creating a pooled data source.
///
/// # Example
///
/// ```rust,ignore
/// let pool = PooledDataSource::builder()
///     .pool_config(PoolConfig::from_properties(&text)?)
///     .max_idle(2)
///     .build()?;
/// ```
#[derive(Debug, Default)]
pub struct PooledDataSourceBuilder {
    pool_config: PoolConfig,
}

impl PooledDataSourceBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole pool configuration.
    #[must_use]
    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    /// Set the driver identity.
    #[must_use]
    pub fn driver(mut self, driver: impl Into<String>) -> Self {
        self.pool_config = self.pool_config.driver(driver);
        self
    }

    /// Set the connection URL.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.pool_config = self.pool_config.url(url);
        self
    }

    /// Set the default user.
    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.pool_config = self.pool_config.username(username);
        self
    }

    /// Set the default password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.pool_config = self.pool_config.password(password);
        self
    }

    /// Set the maximum number of checked-out connections.
    #[must_use]
    pub fn max_active(mut self, count: usize) -> Self {
        self.pool_config.max_active = count;
        self
    }

    /// Set the maximum number of idle connections.
    #[must_use]
    pub fn max_idle(mut self, count: usize) -> Self {
        self.pool_config.max_idle = count;
        self
    }

    /// Set how long a blocked acquire waits between checks.
    #[must_use]
    pub fn time_to_wait(mut self, wait: Duration) -> Self {
        self.pool_config.time_to_wait = wait;
        self
    }

    /// Build the pool.
    pub fn build(self) -> Result<PooledDataSource> {
        PooledDataSource::new(self.pool_config)
    }
}

/// Snapshot of the pool's lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Idle connections ready for reuse.
    pub idle: usize,
    /// Checked-out connections.
    pub active: usize,
    /// Configured active limit.
    pub max_active: usize,
    /// Configured idle limit.
    pub max_idle: usize,
}

impl PoolStatus {
    /// Connections held by the pool, idle or active.
    #[must_use]
    pub fn total(&self) -> usize {
        self.idle + self.active
    }

    /// Check if no more connections can be checked out without waiting.
    #[must_use]
    pub fn is_at_capacity(&self) -> bool {
        self.idle == 0 && self.active >= self.max_active
    }
}
