//! Property tests for pool bookkeeping.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::HashSet;

use proptest::prelude::*;
use sqlpool::{Connection, PoolConfig, PooledConnection, PooledDataSource};
use sqlpool_testing::MockDatabase;

#[derive(Debug, Clone)]
enum Op {
    Acquire,
    Close(usize),
    Drop(usize),
    UseStale(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Acquire),
        2 => any::<usize>().prop_map(Op::Close),
        1 => any::<usize>().prop_map(Op::Drop),
        1 => any::<usize>().prop_map(Op::UseStale),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn bookkeeping_survives_any_checkout_sequence(
        max_active in 1usize..4,
        max_idle in 0usize..3,
        ops in prop::collection::vec(op(), 1..40),
    ) {
        let db = MockDatabase::install();
        let pool = PooledDataSource::new(
            PoolConfig::new()
                .driver(db.identity())
                .url(db.url())
                .max_active(max_active)
                .max_idle(max_idle),
        )
        .unwrap();

        let mut held: Vec<PooledConnection> = Vec::new();
        let mut stale: Vec<PooledConnection> = Vec::new();

        for op in ops {
            match op {
                // A single thread would block forever once saturated.
                Op::Acquire if held.len() < max_active => {
                    held.push(pool.get_connection().unwrap());
                }
                Op::Acquire => {}
                Op::Close(i) if !held.is_empty() => {
                    let mut conn = held.remove(i % held.len());
                    conn.close().unwrap();
                    stale.push(conn);
                }
                Op::Drop(i) if !held.is_empty() => {
                    drop(held.remove(i % held.len()));
                }
                Op::UseStale(i) if !stale.is_empty() => {
                    let n = stale.len();
                    prop_assert!(stale[i % n].execute("SELECT 1").is_err());
                }
                _ => {}
            }

            let status = pool.status();
            prop_assert!(status.active <= max_active);
            prop_assert!(status.idle <= max_idle);
            prop_assert_eq!(status.active, held.len());
            prop_assert_eq!(db.opened() - db.closed(), status.total());

            let owners: HashSet<u64> = held.iter().map(PooledConnection::connection_id).collect();
            prop_assert_eq!(owners.len(), held.len());
            prop_assert!(held.iter().all(PooledConnection::is_in_use));
        }
    }
}
