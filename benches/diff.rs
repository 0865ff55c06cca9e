use std::hint::black_box;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use image::{DynamicImage, Rgba, RgbaImage};
use imcompare::Canonicalizer;
use imcompare::canonical::{CANONICAL_HEIGHT, CANONICAL_WIDTH, CanonicalBuffer};
use imcompare::diff::{DiffOptions, diff, diff_into};
use rand::prelude::*;

fn random_buffer(rng: &mut impl Rng) -> CanonicalBuffer {
    let mut data = vec![0u8; (CANONICAL_WIDTH * CANONICAL_HEIGHT * 4) as usize];
    rng.fill_bytes(&mut data);
    CanonicalBuffer::from_raw(CANONICAL_WIDTH, CANONICAL_HEIGHT, data)
}

fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("Diff");
    let mut rng = rand::rng();
    let a = random_buffer(&mut rng);
    let b = random_buffer(&mut rng);
    let options = DiffOptions::default();

    group.throughput(Throughput::Elements(a.pixel_count() as u64));
    group.bench_function("identical", |bench| {
        let a2 = a.clone();
        bench.iter(|| diff(black_box(&a), black_box(&a2), &options).unwrap());
    });
    group.bench_function("random", |bench| {
        bench.iter(|| diff(black_box(&a), black_box(&b), &options).unwrap());
    });
    group.bench_function("random_include_aa", |bench| {
        let options = options.include_aa(true);
        bench.iter(|| diff(black_box(&a), black_box(&b), &options).unwrap());
    });
    group.bench_function("random_with_output", |bench| {
        let mut out = vec![0u8; a.len()];
        bench.iter(|| diff_into(black_box(&a), black_box(&b), &options, Some(&mut out)).unwrap());
    });
    group.finish();
}

fn bench_canonicalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("Canonicalize");
    let canonicalizer = Canonicalizer::default();
    let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1920, 1080, Rgba([10, 20, 30, 255])));

    group.bench_function("1920x1080", |bench| {
        bench.iter(|| canonicalizer.canonicalize(black_box(&image)));
    });
    group.finish();
}

criterion_group!(benches, bench_diff, bench_canonicalize);
criterion_main!(benches);
