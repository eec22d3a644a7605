//! Process-wide driver management.
//!
//! [`DriverCatalog`] maps a driver identity to a constructor, the way a
//! driver crate makes itself discoverable by name. [`DriverManager`] holds
//! instantiated drivers and opens raw connections through the first one
//! that accepts a URL.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::connection::{BoxConnection, Driver};
use crate::error::{DriverError, Result};

/// Constructor that instantiates a driver.
pub type DriverConstructor = Arc<dyn Fn() -> Result<Arc<dyn Driver>> + Send + Sync>;

static GLOBAL_CATALOG: Lazy<DriverCatalog> = Lazy::new(DriverCatalog::new);
static GLOBAL_MANAGER: Lazy<DriverManager> = Lazy::new(DriverManager::new);

/// Catalog of installable drivers keyed by identity.
#[derive(Default)]
pub struct DriverCatalog {
    constructors: RwLock<HashMap<String, DriverConstructor>>,
}

impl DriverCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide catalog.
    pub fn global() -> &'static DriverCatalog {
        &GLOBAL_CATALOG
    }

    /// Install a constructor under `identity`.
    ///
    /// Returns `true` if an earlier constructor was replaced.
    pub fn install<F>(&self, identity: impl Into<String>, constructor: F) -> bool
    where
        F: Fn() -> Result<Arc<dyn Driver>> + Send + Sync + 'static,
    {
        let identity = identity.into();
        tracing::debug!(driver = %identity, "installing driver constructor");
        self.constructors
            .write()
            .insert(identity, Arc::new(constructor))
            .is_some()
    }

    /// Whether a constructor is installed under `identity`.
    #[must_use]
    pub fn contains(&self, identity: &str) -> bool {
        self.constructors.read().contains_key(identity)
    }

    /// Resolve `identity` and instantiate its driver.
    pub fn resolve(&self, identity: &str) -> Result<Arc<dyn Driver>> {
        // Constructors run without the catalog lock held.
        let constructor = self
            .constructors
            .read()
            .get(identity)
            .cloned()
            .ok_or_else(|| DriverError::UnknownDriver(identity.to_string()))?;

        constructor()
    }
}

impl fmt::Debug for DriverCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let constructors = self.constructors.read();
        f.debug_struct("DriverCatalog")
            .field("identities", &constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Registry of instantiated drivers and the raw connection factory.
#[derive(Default)]
pub struct DriverManager {
    drivers: RwLock<Vec<Arc<dyn Driver>>>,
}

impl DriverManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide manager.
    pub fn global() -> &'static DriverManager {
        &GLOBAL_MANAGER
    }

    /// Register an instantiated driver.
    pub fn register_driver(&self, driver: Arc<dyn Driver>) {
        tracing::info!(driver = driver.name(), "registering driver");
        self.drivers.write().push(driver);
    }

    /// Names of all registered drivers, in registration order.
    #[must_use]
    pub fn drivers(&self) -> Vec<String> {
        self.drivers
            .read()
            .iter()
            .map(|d| d.name().to_string())
            .collect()
    }

    /// Open a raw connection with the first driver that accepts `url`.
    pub fn connect(&self, url: &str, user: &str, password: &str) -> Result<BoxConnection> {
        let driver = self
            .drivers
            .read()
            .iter()
            .find(|d| d.accepts_url(url))
            .cloned()
            .ok_or_else(|| DriverError::NoSuitableDriver {
                url: url.to_string(),
            })?;

        tracing::debug!(driver = driver.name(), url = url, "opening raw connection");
        driver.connect(url, user, password)
    }
}

impl fmt::Debug for DriverManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverManager")
            .field("drivers", &self.drivers())
            .finish()
    }
}
