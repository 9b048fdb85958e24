use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lwwdict_core::LwwDictionary;

fn populated(keys: usize, offset: f64) -> LwwDictionary<u64> {
    let mut dict = LwwDictionary::new();
    for i in 0..keys {
        let ts = offset + i as f64;
        dict.add_at(format!("key:{i}"), i as u64, ts);
        if i % 4 == 0 {
            dict.remove_at(format!("key:{i}"), i as u64, ts + 0.5);
        }
    }
    dict
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    for keys in [100usize, 1_000, 10_000] {
        let left = populated(keys, 0.0);
        let right = populated(keys, 0.25);
        group.bench_with_input(BenchmarkId::from_parameter(keys), &keys, |b, _| {
            b.iter(|| {
                let mut target = left.clone();
                black_box(target.merge(&right))
            })
        });
    }
    group.finish();
}

fn bench_projection(c: &mut Criterion) {
    let mut group = c.benchmark_group("projection");
    for keys in [100usize, 1_000, 10_000] {
        let dict = populated(keys, 0.0);
        group.bench_with_input(BenchmarkId::from_parameter(keys), &keys, |b, _| {
            b.iter(|| black_box(dict.projection()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_merge, bench_projection);
criterion_main!(benches);
