// Lock-free ring buffer throughput under contended push/pop.
// Mirrors the MPMC access pattern the job scheduler's per-worker and
// global work queues put the ring through: many producers racing many
// consumers against a small, fixed-capacity buffer.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rusty_jobs::ring::RingBuffer;
use std::sync::Arc;
use std::thread;

fn bench_single_thread_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_single_thread");
    for capacity in [64usize, 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, &capacity| {
            match capacity {
                64 => {
                    let ring: RingBuffer<u64, 64> = RingBuffer::new();
                    b.iter(|| {
                        ring.push(black_box(1));
                        black_box(ring.pop());
                    });
                }
                _ => {
                    let ring: RingBuffer<u64, 1024> = RingBuffer::new();
                    b.iter(|| {
                        ring.push(black_box(1));
                        black_box(ring.pop());
                    });
                }
            }
        });
    }
    group.finish();
}

fn bench_contended_mpmc(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_contended_mpmc");
    for producers in [2usize, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(producers), &producers, |b, &producers| {
            b.iter(|| {
                let ring: Arc<RingBuffer<u64, 64>> = Arc::new(RingBuffer::new());
                let per_producer = 2000u64;
                let handles: Vec<_> = (0..producers)
                    .map(|_| {
                        let ring = ring.clone();
                        thread::spawn(move || {
                            for i in 0..per_producer {
                                ring.push(i);
                            }
                        })
                    })
                    .collect();
                let mut popped = 0u64;
                while popped < per_producer * producers as u64 {
                    if ring.pop().is_some() {
                        popped += 1;
                    }
                }
                for h in handles {
                    h.join().unwrap();
                }
                black_box(popped);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_single_thread_push_pop, bench_contended_mpmc);
criterion_main!(benches);
