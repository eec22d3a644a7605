//! Driver registration cache.
//!
//! Drivers are resolved from the [`DriverCatalog`] and registered with the
//! [`DriverManager`] at most once per identity for the whole process, no
//! matter how many pools name the same driver.
//!
//! Lock order: a pool may call into the registry while holding its own
//! lock. The registry never calls back into a pool.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use sqlpool_driver::{Driver, DriverCatalog, DriverManager};

use crate::error::{PoolError, Result};

static GLOBAL_REGISTRY: Lazy<DriverRegistry> = Lazy::new(DriverRegistry::new);

/// Process-wide cache of registered drivers.
pub struct DriverRegistry {
    catalog: &'static DriverCatalog,
    manager: &'static DriverManager,
    registered: Mutex<HashMap<String, Arc<dyn Driver>>>,
}

impl DriverRegistry {
    fn new() -> Self {
        Self {
            catalog: DriverCatalog::global(),
            manager: DriverManager::global(),
            registered: Mutex::new(HashMap::new()),
        }
    }

    /// The registry shared by every pool in the process.
    pub fn global() -> &'static DriverRegistry {
        &GLOBAL_REGISTRY
    }

    /// Resolve and register `identity` unless that already happened.
    ///
    /// Concurrent callers for the same identity result in exactly one
    /// resolution and one registration.
    pub fn ensure_registered(&self, identity: &str) -> Result<()> {
        let mut registered = self.registered.lock();
        if registered.contains_key(identity) {
            return Ok(());
        }

        let driver = self
            .catalog
            .resolve(identity)
            .map_err(|source| PoolError::DriverInit {
                driver: identity.to_string(),
                source,
            })?;
        self.manager.register_driver(Arc::clone(&driver));
        registered.insert(identity.to_string(), driver);

        tracing::debug!(driver = identity, "driver registered");
        Ok(())
    }

    /// Whether `identity` has been registered.
    #[must_use]
    pub fn is_registered(&self, identity: &str) -> bool {
        self.registered.lock().contains_key(identity)
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered = self.registered.lock();
        f.debug_struct("DriverRegistry")
            .field("registered", &registered.keys().collect::<Vec<_>>())
            .finish()
    }
}
