//! Throughput benchmarks for the two-anchor lock-free deque.

use cbbs_collections::deque::Deque;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::thread;

fn bench_push_left(c: &mut Criterion) {
    let mut group = c.benchmark_group("deque_push_left");

    for size in [100, 1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let deque = Deque::new();
                for i in 0..size {
                    deque.push_left(i);
                }
                black_box(deque.len());
            });
        });
    }

    group.finish();
}

fn bench_push_then_drain(c: &mut Criterion) {
    c.bench_function("deque_push_left_then_pop_right_1000", |b| {
        b.iter(|| {
            let deque = Deque::new();
            for i in 0..1000 {
                deque.push_left(i);
            }
            while deque.pop_right().is_some() {}
        });
    });
}

fn bench_single_producer_single_consumer(c: &mut Criterion) {
    c.bench_function("deque_spsc_2000_pairs", |b| {
        b.iter(|| {
            let deque = Arc::new(Deque::<i32>::new());
            let pusher = {
                let deque = Arc::clone(&deque);
                thread::spawn(move || {
                    for i in 0..2000 {
                        deque.push_left(i);
                    }
                })
            };
            let popper = {
                let deque = Arc::clone(&deque);
                thread::spawn(move || {
                    let mut popped = 0;
                    while popped < 2000 {
                        if deque.pop_right().is_some() {
                            popped += 1;
                        }
                    }
                })
            };
            pusher.join().unwrap();
            popper.join().unwrap();
            black_box(deque.is_empty());
        });
    });
}

criterion_group!(
    benches,
    bench_push_left,
    bench_push_then_drain,
    bench_single_producer_single_consumer
);
criterion_main!(benches);
