//! Pooled connection handles.
//!
//! A raw connection is wrapped in a fresh [`ConnectionHandle`] every time it
//! moves between the idle and active lists. Callers only ever see a
//! [`PooledConnection`], which forwards every operation to the raw
//! connection except `close`, which hands the connection back to the pool.
//! Once a handle has been returned, everything done through it fails with
//! [`PoolError::StaleHandle`].

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};
use sqlpool_driver::{BoxConnection, Connection, DriverError, Row};

use crate::error::{PoolError, Result};
use crate::pool::PoolInner;

/// A physical driver connection owned by a pool.
pub(crate) struct RawConnection {
    pub(crate) id: u64,
    conn: Mutex<BoxConnection>,
}

impl RawConnection {
    pub(crate) fn new(id: u64, conn: BoxConnection) -> Self {
        Self {
            id,
            conn: Mutex::new(conn),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, BoxConnection> {
        self.conn.lock()
    }

    /// Roll back pending work unless the connection is in auto-commit mode.
    pub(crate) fn rollback_if_needed(&self) -> std::result::Result<(), DriverError> {
        let mut conn = self.conn.lock();
        if !conn.auto_commit()? {
            tracing::debug!(connection_id = self.id, "rolling back pending transaction");
            conn.rollback()?;
        }
        Ok(())
    }

    /// Physically close the driver connection.
    pub(crate) fn close(&self) -> std::result::Result<(), DriverError> {
        tracing::debug!(connection_id = self.id, "closing raw connection");
        self.conn.lock().close()
    }
}

/// One identity of a raw connection in the pool's bookkeeping.
pub(crate) struct ConnectionHandle {
    pub(crate) id: u64,
    pub(crate) raw: Arc<RawConnection>,
    in_use: AtomicBool,
}

impl ConnectionHandle {
    pub(crate) fn new(id: u64, raw: Arc<RawConnection>) -> Self {
        Self {
            id,
            raw,
            in_use: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_in_use(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }

    pub(crate) fn set_in_use(&self, in_use: bool) {
        self.in_use.store(in_use, Ordering::Release);
    }
}

/// A connection checked out of a [`PooledDataSource`](crate::PooledDataSource).
///
/// Behaves like the raw connection it wraps. Calling
/// [`close`](Connection::close) (or dropping the handle while it is still
/// checked out) returns the connection to the pool instead of closing it.
/// After that, every operation through this handle fails with
/// [`PoolError::StaleHandle`] and never reaches the raw connection.
///
/// Equality, hashing and display follow the wrapped raw connection, so two
/// handles that took turns on the same physical connection compare equal.
pub struct PooledConnection {
    pub(crate) handle: Arc<ConnectionHandle>,
    pool: Weak<PoolInner>,
}

impl PooledConnection {
    pub(crate) fn new(handle: Arc<ConnectionHandle>, pool: Weak<PoolInner>) -> Self {
        Self { handle, pool }
    }

    /// Identifier of the wrapped raw connection.
    #[must_use]
    pub fn connection_id(&self) -> u64 {
        self.handle.raw.id
    }

    /// Identifier of this handle; changes every time the raw connection
    /// changes lists.
    #[must_use]
    pub fn handle_id(&self) -> u64 {
        self.handle.id
    }

    /// Whether this handle is still checked out.
    #[must_use]
    pub fn is_in_use(&self) -> bool {
        self.handle.is_in_use()
    }

    fn checked(&self) -> Result<MutexGuard<'_, BoxConnection>> {
        if !self.handle.is_in_use() {
            return Err(PoolError::StaleHandle);
        }
        Ok(self.handle.raw.lock())
    }

    fn release(&self) -> Result<()> {
        self.handle.set_in_use(false);
        match self.pool.upgrade() {
            Some(pool) => pool.release(&self.handle),
            None => {
                // The pool is gone; nothing can reuse the connection.
                self.handle.raw.close()?;
                Ok(())
            }
        }
    }
}

impl Connection for PooledConnection {
    type Error = PoolError;

    fn execute(&mut self, sql: &str) -> Result<u64> {
        Ok(self.checked()?.execute(sql)?)
    }

    fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        Ok(self.checked()?.query(sql)?)
    }

    fn auto_commit(&self) -> Result<bool> {
        Ok(self.checked()?.auto_commit()?)
    }

    fn set_auto_commit(&mut self, enabled: bool) -> Result<()> {
        Ok(self.checked()?.set_auto_commit(enabled)?)
    }

    fn commit(&mut self) -> Result<()> {
        Ok(self.checked()?.commit()?)
    }

    fn rollback(&mut self) -> Result<()> {
        Ok(self.checked()?.rollback()?)
    }

    fn is_closed(&self) -> Result<bool> {
        Ok(self.checked()?.is_closed()?)
    }

    /// Return the connection to the pool.
    ///
    /// Never closes the raw connection itself. Closing an already returned
    /// handle does nothing.
    fn close(&mut self) -> Result<()> {
        self.release()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if !self.handle.is_in_use() {
            return;
        }

        tracing::trace!(
            connection_id = self.handle.raw.id,
            handle_id = self.handle.id,
            "returning dropped connection to pool"
        );
        if let Err(e) = self.release() {
            tracing::warn!(
                connection_id = self.handle.raw.id,
                error = %e,
                "failed to return dropped connection"
            );
        }
    }
}

impl PartialEq for PooledConnection {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.handle.raw, &other.handle.raw)
    }
}

impl Eq for PooledConnection {}

impl Hash for PooledConnection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.handle.raw.id.hash(state);
    }
}

impl fmt::Display for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection#{}", self.handle.raw.id)
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("connection_id", &self.handle.raw.id)
            .field("handle_id", &self.handle.id)
            .field("in_use", &self.handle.is_in_use())
            .finish()
    }
}
