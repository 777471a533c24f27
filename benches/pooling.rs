//! Pooling Operator Benchmark
//!
//! Compares the dispatched depthfirst operator against a naive reference
//! across feature-map sizes typical of CNN backbones.
//!
//! # Usage:
//! ```bash
//! # Run all pooling benchmarks
//! cargo bench --bench pooling
//!
//! # Run a specific group
//! cargo bench --bench pooling -- pooling_3x3_s2
//! ```

use criterion::{criterion_group, criterion_main, Criterion};
use rand::prelude::*;
use std::hint::black_box;

use slidely::pooling::operator::{PoolInfo, PoolingOperator};
use slidely::pooling::{PaddingValues, PoolType};
use slidely::{CpuInfo, OutputStage};

fn create_feature_map(rows: usize, cols: usize, channels: usize, rng: &mut StdRng) -> Vec<f32> {
    (0..rows * cols * channels)
        .map(|_| rng.random_range(-1.0..1.0))
        .collect()
}

fn naive_max_pool_3x3_s2(
    input: &[f32],
    rows: usize,
    cols: usize,
    channels: usize,
    out_rows: usize,
    out_cols: usize,
    output: &mut [f32],
) {
    for oi in 0..out_rows {
        for oj in 0..out_cols {
            for ch in 0..channels {
                let mut best = f32::NEG_INFINITY;
                for r in 0..3 {
                    for c in 0..3 {
                        let ii = (oi * 2 + r) as isize - 1;
                        let jj = (oj * 2 + c) as isize - 1;
                        if ii >= 0 && (ii as usize) < rows && jj >= 0 && (jj as usize) < cols {
                            best =
                                best.max(input[(ii as usize * cols + jj as usize) * channels + ch]);
                        }
                    }
                }
                output[(oi * out_cols + oj) * channels + ch] = best;
            }
        }
    }
}

fn bench_pooling_3x3_s2(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let cpu = CpuInfo::detect();

    let mut group = c.benchmark_group("pooling_3x3_s2");
    for &(rows, cols, channels) in &[(56usize, 56usize, 64usize), (112, 112, 32), (28, 28, 256)] {
        let input = create_feature_map(rows, cols, channels, &mut rng);
        let info = PoolInfo::new(PoolType::Max, (3, 3), (2, 2))
            .with_padding(PaddingValues::uniform(1));
        let operator =
            PoolingOperator::<f32>::new(&cpu, &info, 1, rows, cols, channels, OutputStage::Nothing)
                .expect("supported configuration");
        let (out_rows, out_cols) = operator.output_shape();
        let mut output = vec![0.0f32; out_rows * out_cols * channels];

        group.bench_function(format!("dispatched_{rows}x{cols}x{channels}"), |b| {
            b.iter(|| {
                operator
                    .run(black_box(&input), black_box(&mut output))
                    .unwrap();
            })
        });

        group.bench_function(format!("naive_{rows}x{cols}x{channels}"), |b| {
            b.iter(|| {
                naive_max_pool_3x3_s2(
                    black_box(&input),
                    rows,
                    cols,
                    channels,
                    out_rows,
                    out_cols,
                    black_box(&mut output),
                );
            })
        });
    }
    group.finish();
}

fn bench_global_pooling(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(11);
    let cpu = CpuInfo::detect();

    let mut group = c.benchmark_group("global_average_pooling");
    for &(rows, cols, channels) in &[(7usize, 7usize, 2048usize), (14, 14, 1024)] {
        let input = create_feature_map(rows, cols, channels, &mut rng);
        let info = PoolInfo::global_pool(PoolType::Average);
        let operator =
            PoolingOperator::<f32>::new(&cpu, &info, 1, rows, cols, channels, OutputStage::Nothing)
                .expect("supported configuration");
        let mut output = vec![0.0f32; channels];

        group.bench_function(format!("{rows}x{cols}x{channels}"), |b| {
            b.iter(|| {
                operator
                    .run(black_box(&input), black_box(&mut output))
                    .unwrap();
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_pooling_3x3_s2, bench_global_pooling);
criterion_main!(benches);
