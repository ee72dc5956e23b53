//! Scaler throughput
//!
//! Run with:
//!   cargo bench -- resize

use codecbench::{CpuScaler, FrameBuffer, PixelFormat, Resolution, ScalerStage};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

/// Source/target pairs to benchmark
const CASES: &[(Resolution, Resolution, &str)] = &[
    (Resolution::FHD_1080P, Resolution::HD_720P, "1080p->720p"),
    (Resolution::UHD_4K, Resolution::FHD_1080P, "4K->1080p"),
];

fn frame(res: Resolution, format: PixelFormat) -> FrameBuffer {
    let size = format.frame_size(res).unwrap_or_default();
    let data = (0..size).map(|i| (i % 253) as u8).collect();
    FrameBuffer::from_vec(data).with_format(format)
}

fn bench_resize(c: &mut Criterion) {
    for format in [PixelFormat::Nv12, PixelFormat::Rgba] {
        let mut group = c.benchmark_group(format!("resize_{}", format));
        group.sample_size(10);

        for &(src, dst, name) in CASES {
            let input = frame(src, format);
            group.throughput(Throughput::Bytes(input.len() as u64));

            let mut scaler = CpuScaler::new();
            group.bench_with_input(BenchmarkId::new("bilinear", name), &input, |b, input| {
                b.iter(|| {
                    let out = scaler
                        .resize(input.clone(), src.width, src.height, dst.width, dst.height)
                        .unwrap();
                    std::hint::black_box(out);
                });
            });
        }

        group.finish();
    }
}

criterion_group!(benches, bench_resize);
criterion_main!(benches);
