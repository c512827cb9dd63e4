// Default allocator throughput: the small-object bucketed path against
// the large-object path that falls through to the system allocator.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rusty_jobs::memory::{Allocator, BucketAllocator};

fn bench_small_alloc_dealloc(c: &mut Criterion) {
    let mut group = c.benchmark_group("bucket_small");
    for size in [8usize, 16, 32, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let alloc = BucketAllocator::new();
            b.iter(|| {
                let p = alloc.allocate(size, 8).unwrap();
                black_box(p);
                alloc.deallocate(p);
            });
        });
    }
    group.finish();
}

fn bench_large_alloc_dealloc(c: &mut Criterion) {
    let mut group = c.benchmark_group("bucket_large");
    for size in [256usize, 4096, 65536] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let alloc = BucketAllocator::new();
            b.iter(|| {
                let p = alloc.allocate(size, 16).unwrap();
                black_box(p);
                alloc.deallocate(p);
            });
        });
    }
    group.finish();
}

fn bench_small_alloc_churn(c: &mut Criterion) {
    c.bench_function("bucket_small_churn_1000", |b| {
        let alloc = BucketAllocator::new();
        b.iter(|| {
            let mut ptrs = Vec::with_capacity(1000);
            for _ in 0..1000 {
                ptrs.push(alloc.allocate(32, 8).unwrap());
            }
            for p in ptrs {
                alloc.deallocate(p);
            }
        });
    });
}

criterion_group!(
    benches,
    bench_small_alloc_dealloc,
    bench_large_alloc_dealloc,
    bench_small_alloc_churn
);
criterion_main!(benches);
