//! Benchmarks for the gray-world transform and the frame pipeline.
//!
//! Run with: cargo bench
//!
//! Everything runs on synthetic in-memory frames, so no fixtures are needed.

use std::time::Duration;

use criterion::{BenchmarkId, Criterion};
use graybalance::{
    DiscardSink, Frame, FrameTransform, GrayWorld, MemorySource, PartitionStrategy, Pipeline,
    PipelineOptions,
};
use image::{Rgb, RgbImage};
use rayon::ThreadPoolBuilder;

const WIDTH: u32 = 640;
const HEIGHT: u32 = 360;

fn synthetic_image(seed: u32) -> RgbImage {
    RgbImage::from_fn(WIDTH, HEIGHT, |x, y| {
        Rgb([
            ((x + seed) % 200 + 30) as u8,
            ((y * 3 + seed) % 180 + 50) as u8,
            ((x + y) % 150 + 20) as u8,
        ])
    })
}

fn benchmark_transform(criterion: &mut Criterion) {
    let transform = GrayWorld::new();
    let frame = Frame::new(0, synthetic_image(0));

    criterion.bench_function("gray world 640x360 (sequential)", |bencher| {
        bencher.iter(|| {
            let mut frame = frame.clone();
            transform.apply(&mut frame).unwrap();
        });
    });

    let pool = ThreadPoolBuilder::new().num_threads(4).build().unwrap();
    criterion.bench_function("gray world 640x360 (4 row threads)", |bencher| {
        bencher.iter(|| {
            let mut frame = frame.clone();
            transform.apply_split(&mut frame, &pool).unwrap();
        });
    });
}

fn benchmark_pipeline(criterion: &mut Criterion) {
    let images: Vec<RgbImage> = (0..120).map(synthetic_image).collect();
    let source = MemorySource::new(images, 30.0);

    let mut group = criterion.benchmark_group("pipeline 120 frames");
    group.sample_size(20);
    group.measurement_time(Duration::from_secs(10));

    for strategy in [
        PartitionStrategy::Block,
        PartitionStrategy::Stride,
        PartitionStrategy::RowSplit,
    ] {
        for threads in [1, 4] {
            let options = PipelineOptions::new()
                .with_threads(threads)
                .with_window_size(32)
                .with_strategy(strategy);
            let pipeline = Pipeline::new(options).unwrap();

            group.bench_with_input(
                BenchmarkId::new(strategy.to_string(), threads),
                &pipeline,
                |bencher, pipeline| {
                    bencher.iter(|| pipeline.run(&source, DiscardSink).unwrap());
                },
            );
        }
    }

    group.finish();
}

criterion::criterion_group!(benches, benchmark_transform, benchmark_pipeline);
criterion::criterion_main!(benches);
