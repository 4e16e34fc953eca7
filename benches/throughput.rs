//! Storage engine micro-benchmarks.
//!
//! Measures the sharded store directly, without the network in front of it.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::Arc;
use std::time::Duration;
use susydb::storage::Store;

fn bench_set(c: &mut Criterion) {
    let store = Arc::new(Store::new());

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{i}"));
            store.set(key, Bytes::from("small_value")).unwrap();
            i += 1;
        });
    });

    group.bench_function("set_1k", |b| {
        let mut i = 0u64;
        let value = Bytes::from("x".repeat(1024));
        b.iter(|| {
            let key = Bytes::from(format!("key:{i}"));
            store.set(key, value.clone()).unwrap();
            i += 1;
        });
    });

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let store = Arc::new(Store::new());
    for i in 0..100_000 {
        store
            .set(Bytes::from(format!("key:{i}")), Bytes::from(format!("value:{i}")))
            .unwrap();
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i % 100_000));
            black_box(store.get(&key).unwrap());
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("missing:{i}"));
            black_box(store.get(&key).unwrap());
            i += 1;
        });
    });

    group.finish();
}

fn bench_mixed(c: &mut Criterion) {
    let store = Arc::new(Store::new());
    for i in 0..10_000 {
        store
            .set(Bytes::from(format!("key:{i}")), Bytes::from("value"))
            .unwrap();
    }

    let mut group = c.benchmark_group("mixed");
    group.throughput(Throughput::Elements(1));

    group.bench_function("50_read_50_write", |b| {
        let mut i = 0u64;
        b.iter(|| {
            if i % 2 == 0 {
                let key = Bytes::from(format!("key:{}", i % 10_000));
                store.set(key, Bytes::from("x")).unwrap();
            } else {
                let key = Bytes::from(format!("key:{}", i % 10_000));
                black_box(store.get(&key).unwrap());
            }
            i += 1;
        });
    });

    group.finish();
}

fn bench_incr(c: &mut Criterion) {
    let store = Arc::new(Store::new());

    let mut group = c.benchmark_group("incr");
    group.throughput(Throughput::Elements(1));

    group.bench_function("single_counter", |b| {
        let key = Bytes::from("counter");
        b.iter(|| {
            black_box(store.incr_by(&key, 1).unwrap());
        });
    });

    group.bench_function("spread_counters", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("counter:{}", i % 1000));
            black_box(store.incr_by(&key, 1).unwrap());
            i += 1;
        });
    });

    group.finish();
}

fn bench_hash(c: &mut Criterion) {
    let store = Arc::new(Store::new());

    let mut group = c.benchmark_group("hash");
    group.throughput(Throughput::Elements(1));

    group.bench_function("hset", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("hash:{}", i % 10_000));
            store
                .hset(key, Bytes::from("field1"), Bytes::from("x"))
                .unwrap();
            i += 1;
        });
    });

    group.bench_function("hget", |b| {
        store
            .hset(Bytes::from("hot"), Bytes::from("field1"), Bytes::from("x"))
            .unwrap();
        let key = Bytes::from("hot");
        let field = Bytes::from("field1");
        b.iter(|| {
            black_box(store.hget(&key, &field).unwrap());
        });
    });

    group.finish();
}

fn bench_volatile(c: &mut Criterion) {
    let store = Arc::new(Store::new());

    let mut group = c.benchmark_group("volatile");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_with_ttl", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{i}"));
            store
                .set_with_ttl(key, Bytes::from("x"), Duration::from_secs(3600))
                .unwrap();
            i += 1;
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_mixed,
    bench_incr,
    bench_hash,
    bench_volatile,
);

criterion_main!(benches);
