//! Pool error types.

use sqlpool_driver::DriverError;
use thiserror::Error;

/// Errors that can occur while acquiring or using pooled connections.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The configured driver could not be resolved, instantiated or registered.
    #[error("error setting driver {driver}: {source}")]
    DriverInit {
        /// Driver identity from the pool configuration.
        driver: String,
        /// Why resolution failed.
        source: DriverError,
    },

    /// An operation went through a handle that is not checked out.
    #[error("handle is not checked out")]
    StaleHandle,

    /// A blocked acquire was cancelled before it obtained a connection.
    #[error("connection acquisition interrupted")]
    AcquireInterrupted,

    /// The pool has been closed.
    #[error("pool is closed")]
    PoolClosed,

    /// Invalid pool configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Error from the underlying driver or raw connection.
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Result type for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;
