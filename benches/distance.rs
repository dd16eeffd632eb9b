//! Benchmarks for the weighted distance kernel.
//!
//! The kernel runs once per (query, candidate) pair, so it dominates both
//! weight learning and classification.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;

use wknn::distance::{present_features, weighted_distance, MISSING};

// === Generators ===

fn random_vectors(n: usize, dim: usize, missing_rate: f64) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..n)
        .map(|_| {
            (0..dim)
                .map(|_| {
                    if rng.random::<f64>() < missing_rate {
                        MISSING
                    } else {
                        rng.random::<f64>() * 100.0
                    }
                })
                .collect()
        })
        .collect()
}

// === Benchmarks ===

fn bench_dimensions(c: &mut Criterion) {
    let mut group = c.benchmark_group("weighted_distance");

    for dim in [128, 512, 1225, 2048].iter() {
        group.throughput(Throughput::Elements(*dim as u64));

        let vectors = random_vectors(2, *dim, 0.1);
        let weights = vec![1.0; *dim];
        let present = present_features(&vectors[0]);

        group.bench_with_input(BenchmarkId::from_parameter(dim), dim, |bench, _| {
            bench.iter(|| {
                weighted_distance(
                    black_box(&vectors[0]),
                    black_box(&vectors[1]),
                    black_box(&weights),
                    black_box(&present),
                )
            });
        });
    }

    group.finish();
}

fn bench_missing_rate(c: &mut Criterion) {
    let mut group = c.benchmark_group("weighted_distance_missing");
    let dim = 1225;

    for rate in [0.0, 0.25, 0.5, 0.9].iter() {
        let vectors = random_vectors(2, dim, *rate);
        let weights = vec![1.0; dim];

        group.bench_with_input(BenchmarkId::from_parameter(rate), rate, |bench, _| {
            bench.iter(|| {
                let present = present_features(black_box(&vectors[0]));
                weighted_distance(&vectors[0], black_box(&vectors[1]), &weights, &present)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_dimensions, bench_missing_rate);
criterion_main!(benches);
