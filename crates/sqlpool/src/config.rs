//! Pool configuration.

use std::fmt;
use std::time::Duration;

use crate::error::{PoolError, Result};

/// Configuration for a [`PooledDataSource`](crate::PooledDataSource).
///
/// Set everything before the pool is built; the pool keeps its own copy
/// and never changes it.
#[derive(Clone)]
pub struct PoolConfig {
    /// Driver identity, resolved through the driver catalog.
    pub driver: String,

    /// Connection URL handed to the driver.
    pub url: String,

    /// Default user for [`get_connection`](crate::PooledDataSource::get_connection).
    pub username: String,

    /// Default password.
    pub password: String,

    /// Maximum number of checked-out connections (default: 5).
    pub max_active: usize,

    /// Maximum number of idle connections kept for reuse (default: 10).
    pub max_idle: usize,

    /// How long a blocked acquire sleeps before re-checking (default: 20s).
    ///
    /// Zero means waiting until woken.
    pub time_to_wait: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            driver: String::new(),
            url: String::new(),
            username: String::new(),
            password: String::new(),
            max_active: 5,
            max_idle: 10,
            time_to_wait: Duration::from_millis(20_000),
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a properties document into configuration.
    ///
    /// One `key=value` pair per line; lines starting with `#` or `!` are
    /// comments:
    /// ```text
    /// driver=postgres
    /// url=postgres://localhost/app
    /// userName=app
    /// password=secret
    /// maxActive=8
    /// timeToWait=5000
    /// ```
    pub fn from_properties(text: &str) -> Result<Self> {
        let mut config = Self::default();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }

            // The first separator wins, so values may contain either one.
            let (key, value) = line
                .find(['=', ':'])
                .map(|at| (&line[..at], &line[at + 1..]))
                .ok_or_else(|| PoolError::Config(format!("invalid property: {line}")))?;

            let key = key.trim();
            let value = value.trim();

            match key.to_ascii_lowercase().as_str() {
                "driver" => config.driver = value.to_string(),
                "url" => config.url = value.to_string(),
                "username" | "user" => config.username = value.to_string(),
                "password" => config.password = value.to_string(),
                "maxactive" => config.max_active = parse_count(key, value)?,
                "maxidle" => config.max_idle = parse_count(key, value)?,
                "timetowait" => {
                    let millis: u64 = value.parse().map_err(|_| {
                        PoolError::Config(format!("invalid {key}: {value}"))
                    })?;
                    config.time_to_wait = Duration::from_millis(millis);
                }
                _ => {
                    tracing::debug!(key = key, "ignoring unknown pool property");
                }
            }
        }

        Ok(config)
    }

    /// Set the driver identity.
    #[must_use]
    pub fn driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = driver.into();
        self
    }

    /// Set the connection URL.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the default user.
    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Set the default password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set the maximum number of checked-out connections.
    #[must_use]
    pub fn max_active(mut self, count: usize) -> Self {
        self.max_active = count;
        self
    }

    /// Set the maximum number of idle connections.
    #[must_use]
    pub fn max_idle(mut self, count: usize) -> Self {
        self.max_idle = count;
        self
    }

    /// Set how long a blocked acquire waits between checks.
    #[must_use]
    pub fn time_to_wait(mut self, wait: Duration) -> Self {
        self.time_to_wait = wait;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.driver.is_empty() {
            return Err(PoolError::Config("driver must be set".into()));
        }
        if self.url.is_empty() {
            return Err(PoolError::Config("url must be set".into()));
        }
        if self.max_active == 0 {
            return Err(PoolError::Config(
                "max_active must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn parse_count(key: &str, value: &str) -> Result<usize> {
    value
        .parse()
        .map_err(|_| PoolError::Config(format!("invalid {key}: {value}")))
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("driver", &self.driver)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("max_active", &self.max_active)
            .field("max_idle", &self.max_idle)
            .field("time_to_wait", &self.time_to_wait)
            .finish()
    }
}
