//! Benchmarks for the delineation steps

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hrudel_algorithms::{dissolve, encode_hru, polygonize, DissolveParams, EncodingConfig, HruLayers, PolygonizeParams};
use hrudel_core::{GeoTransform, Raster};

/// A factor layer made of square patches of `patch` cells, cycling through `classes` values
fn patchy(size: usize, patch: usize, classes: usize, salt: usize) -> Raster<f64> {
    let mut r = Raster::new(size, size);
    r.set_transform(GeoTransform::new(0.0, size as f64 * 30.0, 30.0, -30.0));
    for row in 0..size {
        for col in 0..size {
            let v = ((row / patch) * 31 + (col / patch) * 17 + salt) % classes;
            r.set(row, col, v as f64).unwrap();
        }
    }
    r
}

fn layers(size: usize) -> HruLayers {
    HruLayers {
        watershed: patchy(size, 64, 5, 1),
        grid: patchy(size, 32, 7, 2),
        elevation: patchy(size, 8, 20, 3),
        landcover: patchy(size, 5, 12, 4),
        radiation: patchy(size, 12, 9, 5),
    }
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("delineation/encode");
    let config = EncodingConfig::default();
    for size in [256, 512, 1024] {
        let input = layers(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| encode_hru(black_box(&input), &config).unwrap())
        });
    }
    group.finish();
}

fn bench_polygonize(c: &mut Criterion) {
    let mut group = c.benchmark_group("delineation/polygonize");
    group.sample_size(10);
    for size in [128, 256, 512] {
        let coded = encode_hru(&layers(size), &EncodingConfig::default()).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| polygonize(black_box(&coded), &PolygonizeParams::default()).unwrap())
        });
    }
    group.finish();
}

fn bench_dissolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("delineation/dissolve");
    group.sample_size(10);
    for size in [64, 128] {
        let coded = encode_hru(&layers(size), &EncodingConfig::default()).unwrap();
        let polygons = polygonize(&coded, &PolygonizeParams::default()).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| dissolve(black_box(&polygons), &DissolveParams::default()).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_polygonize, bench_dissolve);
criterion_main!(benches);
