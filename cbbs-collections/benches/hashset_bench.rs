//! Throughput benchmarks for the split-ordered hash set.

use cbbs_collections::hashset::HashSet;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::thread;

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("hashset_insert");

    for size in [100, 1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let set = HashSet::new();
                for i in 0..size {
                    set.insert(i);
                }
                black_box(set.len());
            });
        });
    }

    group.finish();
}

fn bench_contains_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("hashset_contains_hit");

    for size in [100, 1_000, 10_000].iter() {
        let set = HashSet::new();
        for i in 0..*size {
            set.insert(i);
        }

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let probe = size / 2;
            b.iter(|| black_box(set.contains(&probe)));
        });
    }

    group.finish();
}

fn bench_contains_miss(c: &mut Criterion) {
    let mut group = c.benchmark_group("hashset_contains_miss");

    for size in [100, 1_000, 10_000].iter() {
        let set = HashSet::new();
        for i in 0..*size {
            set.insert(i);
        }

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| black_box(set.contains(&(size * 2))));
        });
    }

    group.finish();
}

fn bench_concurrent_inserts(c: &mut Criterion) {
    c.bench_function("hashset_four_threads_disjoint_insert", |b| {
        b.iter(|| {
            let set = Arc::new(HashSet::<i32>::new());
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let set = Arc::clone(&set);
                    thread::spawn(move || {
                        for i in t * 1000..t * 1000 + 1000 {
                            set.insert(i);
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
            black_box(set.len());
        });
    });
}

criterion_group!(
    benches,
    bench_insert,
    bench_contains_hit,
    bench_contains_miss,
    bench_concurrent_inserts
);
criterion_main!(benches);
