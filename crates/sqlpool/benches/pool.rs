//! Benchmarks for pool checkout and return.

#![allow(missing_docs, clippy::unwrap_used, clippy::expect_used)]

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use sqlpool::{Connection, PoolConfig, PooledDataSource};
use sqlpool_testing::MockDatabase;

fn pool(max_idle: usize) -> PooledDataSource {
    let db = MockDatabase::install();
    PooledDataSource::new(
        PoolConfig::new()
            .driver(db.identity())
            .url(db.url())
            .max_active(4)
            .max_idle(max_idle),
    )
    .unwrap()
}

fn bench_checkout(c: &mut Criterion) {
    let mut group = c.benchmark_group("checkout");

    let reusing = pool(4);
    group.bench_function("reuse_idle", |b| {
        b.iter(|| {
            let mut conn = reusing.get_connection().unwrap();
            black_box(conn.connection_id());
            conn.close().unwrap();
        })
    });

    let discarding = pool(0);
    group.bench_function("open_and_discard", |b| {
        b.iter(|| {
            let mut conn = discarding.get_connection().unwrap();
            black_box(conn.connection_id());
            conn.close().unwrap();
        })
    });

    group.finish();
}

criterion_group!(benches, bench_checkout);
criterion_main!(benches);
