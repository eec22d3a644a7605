//! In-memory mock driver.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use sqlpool_driver::{
    BoxConnection, Connection, Driver, DriverCatalog, DriverError, Result, Row, Value,
};

static NEXT_DATABASE: AtomicU64 = AtomicU64::new(1);

/// Shared bookkeeping for one mock database.
#[derive(Debug, Default)]
struct MockState {
    next_connection_id: AtomicU64,
    constructions: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
    rollbacks: AtomicUsize,
    fail_connect: AtomicBool,
    fail_rollback: AtomicBool,
    manual_commit: AtomicBool,
    executed: Mutex<Vec<(u64, String)>>,
    connect_users: Mutex<Vec<String>>,
}

/// A mock database installed in the global [`DriverCatalog`].
///
/// Each instance gets its own driver identity and URL, so tests running in
/// the same process never observe each other's connections.
#[derive(Debug, Clone)]
pub struct MockDatabase {
    identity: String,
    url: String,
    state: Arc<MockState>,
}

impl MockDatabase {
    /// Install a fresh mock driver under a unique identity.
    pub fn install() -> Self {
        let n = NEXT_DATABASE.fetch_add(1, Ordering::Relaxed);
        let identity = format!("mock-{n}");
        let db = Self {
            url: format!("mock://{identity}/test"),
            identity,
            state: Arc::new(MockState::default()),
        };

        let state = Arc::clone(&db.state);
        let prefix = format!("mock://{}/", db.identity);
        let name = db.identity.clone();
        DriverCatalog::global().install(db.identity.clone(), move || {
            state.constructions.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(MockDriver {
                name: name.clone(),
                prefix: prefix.clone(),
                state: Arc::clone(&state),
            }) as Arc<dyn Driver>)
        });

        tracing::debug!(driver = %db.identity, "installed mock database");
        db
    }

    /// Driver identity to configure a pool with.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Connection URL accepted by this database's driver.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// How many times the driver constructor ran.
    #[must_use]
    pub fn constructions(&self) -> usize {
        self.state.constructions.load(Ordering::SeqCst)
    }

    /// Raw connections opened so far.
    #[must_use]
    pub fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    /// Raw connections physically closed so far.
    #[must_use]
    pub fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Rollbacks performed on any connection.
    #[must_use]
    pub fn rollbacks(&self) -> usize {
        self.state.rollbacks.load(Ordering::SeqCst)
    }

    /// Statements executed, as `(connection id, sql)` pairs.
    #[must_use]
    pub fn executed(&self) -> Vec<(u64, String)> {
        self.state.executed.lock().clone()
    }

    /// Users passed to the driver when opening connections.
    #[must_use]
    pub fn connect_users(&self) -> Vec<String> {
        self.state.connect_users.lock().clone()
    }

    /// Make subsequent connection attempts fail.
    pub fn set_fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent rollbacks fail.
    pub fn set_fail_rollback(&self, fail: bool) {
        self.state.fail_rollback.store(fail, Ordering::SeqCst);
    }

    /// Open new connections with auto-commit disabled.
    pub fn set_manual_commit(&self, manual: bool) {
        self.state.manual_commit.store(manual, Ordering::SeqCst);
    }
}

/// Driver backing a [`MockDatabase`].
#[derive(Debug)]
pub struct MockDriver {
    name: String,
    prefix: String,
    state: Arc<MockState>,
}

impl Driver for MockDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts_url(&self, url: &str) -> bool {
        url.starts_with(&self.prefix)
    }

    fn connect(&self, _url: &str, user: &str, _password: &str) -> Result<BoxConnection> {
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(DriverError::ConnectionFailed("mock refused connection".into()));
        }

        let id = self.state.next_connection_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        self.state.connect_users.lock().push(user.to_string());

        Ok(Box::new(MockConnection {
            id,
            auto_commit: !self.state.manual_commit.load(Ordering::SeqCst),
            closed: false,
            state: Arc::clone(&self.state),
        }))
    }
}

/// A raw connection opened by [`MockDriver`].
///
/// `query` returns a single row naming the connection that served it.
#[derive(Debug)]
pub struct MockConnection {
    id: u64,
    auto_commit: bool,
    closed: bool,
    state: Arc<MockState>,
}

impl MockConnection {
    /// Driver-assigned connection number.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(DriverError::Closed);
        }
        Ok(())
    }
}

impl Connection for MockConnection {
    type Error = DriverError;

    fn execute(&mut self, sql: &str) -> Result<u64> {
        self.ensure_open()?;
        self.state.executed.lock().push((self.id, sql.to_string()));
        if sql.starts_with("FAIL") {
            return Err(DriverError::Query(format!("mock failure: {sql}")));
        }
        Ok(1)
    }

    fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        self.ensure_open()?;
        self.state.executed.lock().push((self.id, sql.to_string()));
        Ok(vec![Row::new(
            vec!["connection_id".into(), "sql".into()],
            vec![Value::Int(self.id as i64), Value::Text(sql.to_string())],
        )])
    }

    fn auto_commit(&self) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.auto_commit)
    }

    fn set_auto_commit(&mut self, enabled: bool) -> Result<()> {
        self.ensure_open()?;
        self.auto_commit = enabled;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.ensure_open()
    }

    fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.state.fail_rollback.load(Ordering::SeqCst) {
            return Err(DriverError::Transaction("mock rollback failure".into()));
        }
        self.state.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> Result<bool> {
        Ok(self.closed)
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.state.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_mock_database_resolves_and_connects() {
        let db = MockDatabase::install();
        let driver = DriverCatalog::global().resolve(db.identity()).unwrap();
        assert_eq!(db.constructions(), 1);
        assert!(driver.accepts_url(db.url()));
        assert!(!driver.accepts_url("mock://someone-else/test"));

        let mut conn = driver.connect(db.url(), "sa", "secret").unwrap();
        conn.execute("SELECT 1").unwrap();
        conn.close().unwrap();
        conn.close().unwrap();

        assert_eq!(db.opened(), 1);
        assert_eq!(db.closed(), 1);
        assert_eq!(db.connect_users(), vec!["sa".to_string()]);
        assert!(matches!(conn.execute("SELECT 1"), Err(DriverError::Closed)));
    }

    #[test]
    fn test_mock_failure_switches() {
        let db = MockDatabase::install();
        let driver = DriverCatalog::global().resolve(db.identity()).unwrap();

        db.set_fail_connect(true);
        assert!(driver.connect(db.url(), "sa", "").is_err());
        db.set_fail_connect(false);

        db.set_manual_commit(true);
        let mut conn = driver.connect(db.url(), "sa", "").unwrap();
        assert!(!conn.auto_commit().unwrap());

        db.set_fail_rollback(true);
        assert!(matches!(conn.rollback(), Err(DriverError::Transaction(_))));
        assert_eq!(db.rollbacks(), 0);
    }
}
