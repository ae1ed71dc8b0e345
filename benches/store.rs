//! Store Benchmark for CinderKV
//!
//! Measures the storage engine under basic workloads, with and without
//! the eviction path engaged.

use cinderkv::storage::Store;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::time::Duration;

/// Benchmark SET operations
fn bench_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_unbounded", |b| {
        let store = Store::new(0);
        let mut i = 0u64;
        b.iter(|| {
            store.set(format!("key:{}", i), "value");
            i += 1;
        });
    });

    group.bench_function("set_with_eviction", |b| {
        // Every insert past the first 1024 evicts the LRU victim
        let store = Store::new(1024);
        let mut i = 0u64;
        b.iter(|| {
            store.set(format!("key:{}", i), "value");
            i += 1;
        });
    });

    group.bench_function("set_with_ttl", |b| {
        let store = Store::new(0);
        let mut i = 0u64;
        b.iter(|| {
            store.set_with_ttl(format!("key:{}", i), "value", Duration::from_secs(60));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark GET operations
fn bench_get(c: &mut Criterion) {
    let store = Store::new(0);
    for i in 0..100_000 {
        store.set(format!("key:{}", i), format!("value:{}", i));
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            black_box(store.get(&format!("key:{}", i % 100_000)));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            black_box(store.get(&format!("missing:{}", i)));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark a mixed workload
fn bench_mixed(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed");
    group.throughput(Throughput::Elements(2));

    group.bench_function("set_then_get", |b| {
        let store = Store::new(4096);
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 8192);
            store.set(key.clone(), "value");
            black_box(store.get(&key));
            i += 1;
        });
    });

    group.finish();
}

criterion_group!(benches, bench_set, bench_get, bench_mixed);
criterion_main!(benches);
