//! # sqlpool-testing
//!
//! Test infrastructure for the sqlpool workspace.
//!
//! Provides an in-memory driver whose connections record everything done
//! to them, so pool behaviour can be asserted without a database server.
//!
//! ```rust,ignore
//! use sqlpool_testing::MockDatabase;
//!
//! let db = MockDatabase::install();
//! let pool = PooledDataSource::new(
//!     PoolConfig::new().driver(db.identity()).url(db.url()),
//! )?;
//! let mut conn = pool.get_connection()?;
//! conn.execute("INSERT INTO t VALUES (1)")?;
//! assert_eq!(db.opened(), 1);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod mock;

pub use mock::{MockConnection, MockDatabase, MockDriver};
