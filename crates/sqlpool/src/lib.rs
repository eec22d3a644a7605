//! # sqlpool
//!
//! Blocking database connection pool with transparent return-on-close
//! handles.
//!
//! A [`PooledDataSource`] keeps a bounded set of raw driver connections and
//! hands out [`PooledConnection`]s. A pooled connection implements the same
//! [`Connection`] trait as a raw one, except that `close` returns it to the
//! pool instead of tearing down the network connection.
//!
//! ## Features
//!
//! - Idle reuse (FIFO) with a bounded idle list
//! - Bounded active connections; exhaustion blocks instead of failing
//! - Reclaim of the oldest active connection when its handle was abandoned
//! - Rollback of pending work before a connection is reused
//! - Handles are retired on return, so stale handles cannot touch the
//!   connection again
//! - Process-wide, register-once driver cache
//!
//! ## Example
//!
//! ```rust,ignore
//! use sqlpool::{Connection, PoolConfig, PooledDataSource};
//!
//! let config = PoolConfig::from_properties(&std::fs::read_to_string("db.properties")?)?;
//! let pool = PooledDataSource::new(config)?;
//!
//! let mut conn = pool.get_connection()?;
//! for row in conn.query("SELECT id, name FROM users")? {
//!     println!("{:?}", row.get_by_name("name"));
//! }
//! conn.close()?; // returned to the pool
//!
//! // Using the handle after returning it fails.
//! assert!(conn.execute("SELECT 1").is_err());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod error;
pub mod pool;
pub mod registry;
mod state;

// Configuration
pub use config::PoolConfig;

// Error types
pub use error::{PoolError, Result};

// Pool types
pub use connection::PooledConnection;
pub use pool::{CancelToken, PoolStatus, PooledDataSource, PooledDataSourceBuilder};
pub use registry::DriverRegistry;

// Driver interfaces
pub use sqlpool_driver::{Connection, Driver, DriverError, Row, Value};
