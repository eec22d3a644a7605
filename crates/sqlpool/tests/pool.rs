//! Pool behaviour tests against the in-memory mock driver.
//!
//! Run with:
//!
//! ```bash
//! cargo test -p sqlpool --test pool
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::HashSet;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use sqlpool::{Connection, DriverError, DriverRegistry, PoolConfig, PoolError, PooledDataSource};
use sqlpool_testing::MockDatabase;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn config_for(db: &MockDatabase) -> PoolConfig {
    PoolConfig::new()
        .driver(db.identity())
        .url(db.url())
        .username("app")
        .password("secret")
}

// =============================================================================
// Reuse and return
// =============================================================================

#[test]
fn test_released_connection_is_reused_under_new_handle() {
    init_tracing();
    let db = MockDatabase::install();
    let pool = PooledDataSource::new(config_for(&db).max_active(1).max_idle(1)).unwrap();

    let mut a = pool.get_connection().unwrap();
    let raw = a.connection_id();
    a.close().unwrap();

    let status = pool.status();
    assert_eq!((status.idle, status.active), (1, 0));

    let b = pool.get_connection().unwrap();
    assert_eq!(b.connection_id(), raw);
    assert_ne!(b.handle_id(), a.handle_id());
    assert_eq!(a, b);
    assert_eq!(a.to_string(), b.to_string());

    let status = pool.status();
    assert_eq!((status.idle, status.active), (0, 1));
    assert_eq!(db.opened(), 1);
}

#[test]
fn test_full_idle_list_closes_returned_connection() {
    let db = MockDatabase::install();
    let pool = PooledDataSource::new(config_for(&db).max_active(1).max_idle(0)).unwrap();

    let mut a = pool.get_connection().unwrap();
    let first_raw = a.connection_id();
    a.close().unwrap();

    assert_eq!(db.closed(), 1);
    assert_eq!(pool.status().total(), 0);

    let b = pool.get_connection().unwrap();
    assert_ne!(b.connection_id(), first_raw);
    assert_eq!(db.opened(), 2);
}

#[test]
fn test_idle_connections_are_reused_in_fifo_order() {
    let db = MockDatabase::install();
    let pool = PooledDataSource::new(config_for(&db).max_active(3).max_idle(3)).unwrap();

    let mut first = pool.get_connection().unwrap();
    let mut second = pool.get_connection().unwrap();
    let (first_id, second_id) = (first.connection_id(), second.connection_id());
    second.close().unwrap();
    first.close().unwrap();

    assert_eq!(pool.get_connection().unwrap().connection_id(), second_id);
    // The previous handle went back on drop and queued behind `first`.
    assert_eq!(pool.get_connection().unwrap().connection_id(), first_id);
}

#[test]
fn test_dropping_handle_returns_connection() {
    let db = MockDatabase::install();
    let pool = PooledDataSource::new(config_for(&db)).unwrap();

    {
        let mut conn = pool.get_connection().unwrap();
        conn.execute("SELECT 1").unwrap();
        assert_eq!(pool.status().active, 1);
    }

    let status = pool.status();
    assert_eq!((status.idle, status.active), (1, 0));
    assert_eq!(db.closed(), 0);
}

#[test]
fn test_supplied_credentials_open_new_connections() {
    let db = MockDatabase::install();
    let pool = PooledDataSource::new(config_for(&db)).unwrap();

    let _default = pool.get_connection().unwrap();
    let _other = pool.get_connection_with("reporting", "pw").unwrap();

    assert_eq!(
        db.connect_users(),
        vec!["app".to_string(), "reporting".to_string()]
    );
}

#[test]
fn test_pooled_connection_forwards_operations() {
    let db = MockDatabase::install();
    let pool = PooledDataSource::new(config_for(&db)).unwrap();

    let mut conn = pool.get_connection().unwrap();
    let rows = conn.query("SELECT name FROM users").unwrap();
    assert_eq!(
        rows[0].get_by_name("connection_id").and_then(|v| v.as_i64()),
        Some(1)
    );
    assert!(conn.auto_commit().unwrap());
    conn.set_auto_commit(false).unwrap();
    conn.commit().unwrap();
    assert!(!conn.is_closed().unwrap());

    let err = conn.execute("FAIL please").unwrap_err();
    assert!(matches!(err, PoolError::Driver(DriverError::Query(_))));
    // A driver error does not end the checkout.
    assert!(conn.is_in_use());

    // auto-commit was left off, so returning rolls back.
    conn.close().unwrap();
    assert_eq!(db.rollbacks(), 1);
}

// =============================================================================
// Stale handles
// =============================================================================

#[test]
fn test_stale_handle_is_rejected() {
    let db = MockDatabase::install();
    let pool = PooledDataSource::new(config_for(&db)).unwrap();

    let mut conn = pool.get_connection().unwrap();
    conn.execute("UPDATE t SET x = 1").unwrap();
    conn.close().unwrap();
    assert!(!conn.is_in_use());

    assert!(matches!(conn.execute("UPDATE t SET x = 2"), Err(PoolError::StaleHandle)));
    assert!(matches!(conn.query("SELECT 1"), Err(PoolError::StaleHandle)));
    assert!(matches!(conn.rollback(), Err(PoolError::StaleHandle)));
    assert!(matches!(conn.is_closed(), Err(PoolError::StaleHandle)));

    let executed: Vec<String> = db.executed().into_iter().map(|(_, sql)| sql).collect();
    assert_eq!(executed, vec!["UPDATE t SET x = 1".to_string()]);
}

#[test]
fn test_stale_handle_cannot_reach_new_owner() {
    let db = MockDatabase::install();
    let pool = PooledDataSource::new(config_for(&db).max_active(1)).unwrap();

    let mut old = pool.get_connection().unwrap();
    old.close().unwrap();
    let mut current = pool.get_connection().unwrap();
    assert_eq!(old, current);

    assert!(matches!(old.execute("DELETE FROM t"), Err(PoolError::StaleHandle)));
    // Closing the stale handle again must not hand the connection back.
    old.close().unwrap();
    assert_eq!(pool.status().active, 1);
    assert_eq!(pool.status().idle, 0);
    current.execute("SELECT 1").unwrap();
}

#[test]
fn test_double_close_does_not_overfill_idle() {
    let db = MockDatabase::install();
    let pool = PooledDataSource::new(config_for(&db).max_active(2).max_idle(1)).unwrap();

    let mut a = pool.get_connection().unwrap();
    let mut b = pool.get_connection().unwrap();
    a.close().unwrap();
    a.close().unwrap();
    b.close().unwrap();
    b.close().unwrap();

    let status = pool.status();
    assert_eq!((status.idle, status.active), (1, 0));
    assert_eq!(db.closed(), 1);
}

// =============================================================================
// Blocking and waking
// =============================================================================

#[test]
fn test_release_wakes_blocked_acquire() {
    init_tracing();
    let db = MockDatabase::install();
    let pool = PooledDataSource::new(
        config_for(&db)
            .max_active(1)
            .max_idle(1)
            .time_to_wait(Duration::from_secs(10)),
    )
    .unwrap();

    let mut held = pool.get_connection().unwrap();
    let started = Instant::now();
    let waiter = {
        let pool = pool.clone();
        thread::spawn(move || pool.get_connection().map(|c| c.connection_id()))
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!waiter.is_finished());
    let raw = held.connection_id();
    held.close().unwrap();

    assert_eq!(waiter.join().unwrap().unwrap(), raw);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_discarding_release_also_wakes_blocked_acquire() {
    let db = MockDatabase::install();
    let pool = PooledDataSource::new(
        config_for(&db)
            .max_active(1)
            .max_idle(0)
            .time_to_wait(Duration::from_secs(10)),
    )
    .unwrap();

    let mut held = pool.get_connection().unwrap();
    let started = Instant::now();
    let waiter = {
        let pool = pool.clone();
        thread::spawn(move || pool.get_connection().map(|c| c.connection_id()))
    };

    thread::sleep(Duration::from_millis(100));
    held.close().unwrap();

    let id = waiter.join().unwrap().unwrap();
    assert_ne!(id, held.connection_id());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_waiter_rechecks_after_time_to_wait() {
    let db = MockDatabase::install();
    let pool = PooledDataSource::new(
        config_for(&db)
            .max_active(1)
            .time_to_wait(Duration::from_millis(20)),
    )
    .unwrap();

    let held = pool.get_connection().unwrap();
    let waiter = {
        let pool = pool.clone();
        thread::spawn(move || pool.get_connection().map(|c| c.connection_id()))
    };

    // Several timeouts pass without an error surfacing.
    thread::sleep(Duration::from_millis(150));
    assert!(!waiter.is_finished());
    drop(held);

    assert!(waiter.join().unwrap().is_ok());
}

#[test]
fn test_cancelled_acquire_leaves_pool_untouched() {
    let db = MockDatabase::install();
    let pool = PooledDataSource::new(config_for(&db).max_active(1)).unwrap();

    let _held = pool.get_connection().unwrap();
    let token = pool.cancel_token();
    let waiter = {
        let pool = pool.clone();
        let token = token.clone();
        thread::spawn(move || pool.get_connection_cancellable("app", "secret", &token))
    };

    thread::sleep(Duration::from_millis(50));
    token.cancel();
    assert!(token.is_cancelled());

    assert!(matches!(waiter.join().unwrap(), Err(PoolError::AcquireInterrupted)));
    let status = pool.status();
    assert_eq!((status.idle, status.active), (0, 1));
    assert_eq!(db.opened(), 1);
}

#[test]
fn test_cancelled_token_fails_later_acquires() {
    let db = MockDatabase::install();
    let pool = PooledDataSource::new(config_for(&db)).unwrap();
    let token = pool.cancel_token();

    assert!(pool.get_connection_cancellable("app", "secret", &token).is_ok());
    token.cancel();
    assert!(matches!(
        pool.get_connection_cancellable("app", "secret", &token),
        Err(PoolError::AcquireInterrupted)
    ));
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_unknown_driver_fails_acquire() {
    let pool = PooledDataSource::new(
        PoolConfig::new()
            .driver("definitely-not-installed")
            .url("none://db"),
    )
    .unwrap();

    let err = pool.get_connection().unwrap_err();
    assert!(matches!(
        err,
        PoolError::DriverInit { ref driver, source: DriverError::UnknownDriver(_) }
            if driver == "definitely-not-installed"
    ));
    assert_eq!(pool.status().total(), 0);
}

#[test]
fn test_connection_failure_propagates_without_blocking() {
    let db = MockDatabase::install();
    let pool = PooledDataSource::new(config_for(&db).time_to_wait(Duration::from_secs(30))).unwrap();
    db.set_fail_connect(true);

    let started = Instant::now();
    let err = pool.get_connection().unwrap_err();
    assert!(matches!(err, PoolError::Driver(DriverError::ConnectionFailed(_))));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(pool.status().total(), 0);

    db.set_fail_connect(false);
    assert!(pool.get_connection().is_ok());
}

#[test]
fn test_invalid_config_is_rejected() {
    let err = PooledDataSource::new(PoolConfig::new().url("mock://x/")).unwrap_err();
    assert!(matches!(err, PoolError::Config(_)));
}

// =============================================================================
// Closing
// =============================================================================

#[test]
fn test_close_fails_waiters_and_closes_connections() {
    let db = MockDatabase::install();
    let pool = PooledDataSource::new(
        config_for(&db)
            .max_active(2)
            .time_to_wait(Duration::from_secs(10)),
    )
    .unwrap();

    let mut idle = pool.get_connection().unwrap();
    let mut held = pool.get_connection().unwrap();
    idle.close().unwrap();
    let _other = pool.get_connection().unwrap();

    let waiter = {
        let pool = pool.clone();
        thread::spawn(move || pool.get_connection())
    };
    thread::sleep(Duration::from_millis(50));

    pool.close();
    assert!(pool.is_closed());
    assert!(matches!(waiter.join().unwrap(), Err(PoolError::PoolClosed)));

    held.close().unwrap();
    assert_eq!(db.closed(), 1);
    assert_eq!(pool.status().total(), 1);
    assert!(matches!(pool.get_connection(), Err(PoolError::PoolClosed)));
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_concurrent_checkouts_never_share_a_connection() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 50;

    let db = MockDatabase::install();
    let pool = PooledDataSource::new(
        config_for(&db)
            .max_active(3)
            .max_idle(2)
            .time_to_wait(Duration::from_millis(5)),
    )
    .unwrap();
    let owners = Arc::new(Mutex::new(HashSet::new()));
    let barrier = Arc::new(Barrier::new(THREADS));

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let pool = pool.clone();
            let owners = Arc::clone(&owners);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..ROUNDS {
                    let mut conn = pool.get_connection().unwrap();
                    let id = conn.connection_id();
                    assert!(owners.lock().unwrap().insert(id), "connection {id} shared");

                    let status = pool.status();
                    assert!(status.active <= status.max_active);
                    assert!(status.idle <= status.max_idle);

                    conn.execute("SELECT 1").unwrap();
                    owners.lock().unwrap().remove(&id);
                    conn.close().unwrap();
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    let status = pool.status();
    assert_eq!(status.active, 0);
    assert!(status.idle <= 2);
    assert_eq!(db.opened() - db.closed(), status.total());
}

#[test]
fn test_driver_registration_happens_once_across_threads_and_pools() {
    let db = MockDatabase::install();
    let barrier = Arc::new(Barrier::new(8));

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            let identity = db.identity().to_string();
            thread::spawn(move || {
                barrier.wait();
                DriverRegistry::global().ensure_registered(&identity).unwrap();
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let first = PooledDataSource::new(config_for(&db)).unwrap();
    let second = PooledDataSource::new(config_for(&db)).unwrap();
    let _a = first.get_connection().unwrap();
    let _b = second.get_connection().unwrap();

    assert_eq!(db.constructions(), 1);
    assert!(DriverRegistry::global().is_registered(db.identity()));
}
