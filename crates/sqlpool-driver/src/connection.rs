//! Raw connection and driver interfaces.
//!
//! These are the seams between the pool and the transport that actually
//! talks to a database. A pool never looks behind them.

use crate::error::DriverError;
use crate::row::Row;

/// The capability set of a database connection.
///
/// Raw driver connections implement this with [`DriverError`]; pooled
/// handles implement it too, so callers can write code against
/// `C: Connection` without caring whether the connection is pooled.
pub trait Connection: Send {
    /// Error type surfaced by every operation.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Execute a statement, returning the number of affected rows.
    fn execute(&mut self, sql: &str) -> Result<u64, Self::Error>;

    /// Execute a query and collect its rows.
    fn query(&mut self, sql: &str) -> Result<Vec<Row>, Self::Error>;

    /// Whether each statement commits on its own.
    fn auto_commit(&self) -> Result<bool, Self::Error>;

    /// Enable or disable auto-commit.
    fn set_auto_commit(&mut self, enabled: bool) -> Result<(), Self::Error>;

    /// Commit the current transaction.
    fn commit(&mut self) -> Result<(), Self::Error>;

    /// Roll back the current transaction.
    fn rollback(&mut self) -> Result<(), Self::Error>;

    /// Whether the connection has been closed.
    fn is_closed(&self) -> Result<bool, Self::Error>;

    /// Release the connection.
    ///
    /// For a raw connection this closes the underlying resource.
    fn close(&mut self) -> Result<(), Self::Error>;
}

/// A boxed raw connection as handed out by drivers.
pub type BoxConnection = Box<dyn Connection<Error = DriverError>>;

/// A database driver able to open raw connections.
pub trait Driver: Send + Sync {
    /// Human readable driver name.
    fn name(&self) -> &str;

    /// Whether this driver understands the given URL.
    fn accepts_url(&self, url: &str) -> bool;

    /// Open a new raw connection.
    fn connect(&self, url: &str, user: &str, password: &str) -> Result<BoxConnection, DriverError>;
}
