//! Driver-level error types.

use thiserror::Error;

/// Errors raised by drivers and raw connections.
///
/// The pool never rewrites these; they reach the caller unchanged.
#[derive(Debug, Error)]
pub enum DriverError {
    /// No registered driver accepts the connection URL.
    #[error("no suitable driver found for {url}")]
    NoSuitableDriver {
        /// The URL nobody accepted.
        url: String,
    },

    /// Nothing is installed in the catalog under this driver identity.
    #[error("unknown driver: {0}")]
    UnknownDriver(String),

    /// The driver could not open a connection.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The raw connection has already been closed.
    #[error("connection is closed")]
    Closed,

    /// Statement execution failed.
    #[error("query error: {0}")]
    Query(String),

    /// Commit or rollback failed.
    #[error("transaction error: {0}")]
    Transaction(String),
}

/// Result type for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;
