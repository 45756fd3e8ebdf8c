use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use preprocess::{CpuPreProcessor, Preprocess};

/// Create raw pixel buffer for benchmarking (gradient pattern)
fn create_test_pixels(width: u32, height: u32) -> Vec<u8> {
    let mut pixels = vec![0u8; (width * height * 3) as usize];
    for y in 0..height {
        for x in 0..width {
            let idx = ((y * width + x) * 3) as usize;
            pixels[idx] = (x % 256) as u8;
            pixels[idx + 1] = (y % 256) as u8;
            pixels[idx + 2] = ((x + y) % 256) as u8;
        }
    }
    pixels
}

fn bench_letterbox(c: &mut Criterion) {
    let mut group = c.benchmark_group("letterbox");

    for (width, height, label) in [(640, 480, "VGA"), (1280, 720, "HD"), (1920, 1080, "FHD")] {
        let pixels = create_test_pixels(width, height);
        let mut preprocessor = CpuPreProcessor::default();

        group.bench_with_input(BenchmarkId::new("cpu", label), &pixels, |b, pixels| {
            b.iter(|| {
                preprocessor
                    .preprocess(black_box(pixels), black_box(width), black_box(height))
                    .unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_letterbox);
criterion_main!(benches);
