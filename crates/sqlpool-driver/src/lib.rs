//! # sqlpool-driver
//!
//! Driver and raw connection interfaces consumed by the `sqlpool`
//! connection pool.
//!
//! This crate owns nothing that talks to a network. It defines the
//! [`Connection`] capability set, the [`Driver`] trait that opens raw
//! connections, and the process-wide [`DriverCatalog`] and
//! [`DriverManager`] through which drivers are found by identity and asked
//! for connections.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sqlpool_driver::{DriverCatalog, DriverManager};
//!
//! // A driver crate makes itself resolvable by name...
//! DriverCatalog::global().install("acme", || Ok(Arc::new(AcmeDriver::new())));
//!
//! // ...and once registered, the manager opens connections through it.
//! let driver = DriverCatalog::global().resolve("acme")?;
//! DriverManager::global().register_driver(driver);
//! let conn = DriverManager::global().connect("acme://db", "sa", "secret")?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connection;
pub mod error;
pub mod manager;
pub mod row;

pub use connection::{BoxConnection, Connection, Driver};
pub use error::{DriverError, Result};
pub use manager::{DriverCatalog, DriverConstructor, DriverManager};
pub use row::{Row, Value};
