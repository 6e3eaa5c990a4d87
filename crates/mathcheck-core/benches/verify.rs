//! Benchmarks for the per-element verification hot path

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mathcheck_core::{reference, specials, ulp_error, verify, FloatFormat, Tolerance};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn random_floats(n: usize) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    (0..n).map(|_| f32::from_bits(rng.gen())).collect()
}

/// Ulp metric over random bit patterns
fn bench_ulp_error(c: &mut Criterion) {
    let mut group = c.benchmark_group("ulp_error");

    for n in [1024usize, 65536] {
        let inputs = random_floats(n);
        let references: Vec<f64> = inputs.iter().map(|&x| reference::exp(f64::from(x))).collect();
        group.throughput(Throughput::Elements(n as u64));

        group.bench_with_input(BenchmarkId::new("f32", n), &n, |bencher, _| {
            bencher.iter(|| {
                for (&x, &r) in inputs.iter().zip(&references) {
                    black_box(ulp_error(black_box(x), r));
                }
            });
        });
    }

    group.finish();
}

/// Full cascade where every element is exact (fast path)
fn bench_verify_exact(c: &mut Criterion) {
    let mut group = c.benchmark_group("verify_exact");
    let n = 65536;
    let inputs = random_floats(n);
    let references: Vec<f64> = inputs.iter().map(|&x| reference::sqrt(f64::from(x))).collect();
    let device: Vec<f32> = references.iter().map(|&r| r as f32).collect();
    let tolerance = Tolerance::ulps(3.0);

    group.throughput(Throughput::Elements(n as u64));
    group.bench_function("sqrt_f32", |bencher| {
        bencher.iter(|| {
            for ((&x, &r), &d) in inputs.iter().zip(&references).zip(&device) {
                black_box(verify(d, &[x], r, &tolerance, |a| reference::sqrt(a[0])));
            }
        });
    });

    group.finish();
}

/// Flush-to-zero retries over the special-value cross product
fn bench_verify_ftz_retries(c: &mut Criterion) {
    let mut group = c.benchmark_group("verify_ftz_retries");
    let table = specials::<f32>();
    let tolerance = Tolerance::ulps(0.0).with_ftz(true);

    group.throughput(Throughput::Elements((table.len() * table.len()) as u64));
    group.bench_function("atan2_specials", |bencher| {
        bencher.iter(|| {
            for &x in &table {
                for &y in &table {
                    let r = reference::atan2(f64::from(x), f64::from(y));
                    // device flushes both inputs
                    let d = reference::atan2(f64::from(x.flush_to_zero()), f64::from(y.flush_to_zero())) as f32;
                    black_box(verify(d, &[x, y], r, &tolerance, |a| reference::atan2(a[0], a[1])));
                }
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_ulp_error, bench_verify_exact, bench_verify_ftz_retries);
criterion_main!(benches);
