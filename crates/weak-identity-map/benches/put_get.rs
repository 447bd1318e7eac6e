//! Benchmark: map operations and reclamation throughput.
//!
//! Measures `put`/`get` under the map lock and the cost of evicting a batch
//! of unreachable keys with a forced reclamation pass.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use weak_identity_map::{collect, Key, WeakIdentityMap};

fn bench_get_hit(c: &mut Criterion) {
    let map = WeakIdentityMap::new();
    let keys: Vec<Key<u64>> = (0..1024).map(Key::new).collect();
    for key in &keys {
        map.put(key, **key).unwrap();
    }

    c.bench_function("get_hit_1024", |b| {
        b.iter(|| {
            for key in &keys {
                black_box(map.get(key));
            }
        });
    });
}

fn bench_put_overwrite(c: &mut Criterion) {
    let map = WeakIdentityMap::new();
    let key = Key::new(0u64);

    c.bench_function("put_overwrite", |b| {
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            map.put(&key, black_box(n)).unwrap();
        });
    });
}

fn bench_evict(c: &mut Criterion) {
    let mut group = c.benchmark_group("put_drop_collect");
    for size in [100usize, 1000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let map = WeakIdentityMap::new();
            b.iter(|| {
                let keys: Vec<Key<usize>> = (0..size).map(Key::new).collect();
                for key in &keys {
                    map.put(key, **key).unwrap();
                }
                drop(keys);
                collect();
                assert!(map.is_empty());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_get_hit, bench_put_overwrite, bench_evict);
criterion_main!(benches);
