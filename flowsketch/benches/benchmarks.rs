//! Throughput benchmarks for the core sketch catalog

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use flowsketch::composite::{ElasticSketch, NitroSketch};
use flowsketch::frequency::{ConservativeCountMin, CountMinSketch, CountSketch};
use flowsketch::heavy_hitters::SpaceSaving;
use flowsketch::membership::BloomFilter;
use flowsketch::{AwareHash, FlowKey};

fn keys(n: u32) -> Vec<FlowKey<13>> {
    (0..n)
        .map(|v| {
            let mut bytes = [0u8; 13];
            bytes[..4].copy_from_slice(&v.to_le_bytes());
            bytes[4..8].copy_from_slice(&(v.wrapping_mul(2654435761)).to_le_bytes());
            FlowKey::new(bytes)
        })
        .collect()
}

fn bench_frequency(c: &mut Criterion) {
    let keys = keys(10_000);

    let mut group = c.benchmark_group("frequency");
    group.bench_function("count_min_update", |b| {
        let mut cm = CountMinSketch::<u32, AwareHash>::with_seed(4, 65536, 1).unwrap();
        let mut i = 0;
        b.iter(|| {
            cm.update(black_box(&keys[i % keys.len()]), 1);
            i += 1;
        });
    });
    group.bench_function("count_min_query", |b| {
        let mut cm = CountMinSketch::<u32, AwareHash>::with_seed(4, 65536, 1).unwrap();
        for k in &keys {
            cm.update(k, 1);
        }
        let mut i = 0;
        b.iter(|| {
            black_box(cm.query(&keys[i % keys.len()]));
            i += 1;
        });
    });
    group.bench_function("conservative_update", |b| {
        let mut cu = ConservativeCountMin::<u32, AwareHash>::with_seed(4, 65536, 1).unwrap();
        let mut i = 0;
        b.iter(|| {
            cu.update(black_box(&keys[i % keys.len()]), 1);
            i += 1;
        });
    });
    group.bench_function("count_sketch_update", |b| {
        let mut cs = CountSketch::<i64, AwareHash>::with_seed(5, 65536, 1).unwrap();
        let mut i = 0;
        b.iter(|| {
            cs.update(black_box(&keys[i % keys.len()]), 1);
            i += 1;
        });
    });
    group.finish();
}

fn bench_membership(c: &mut Criterion) {
    let keys = keys(10_000);
    c.bench_function("bloom_insert", |b| {
        let mut bf = BloomFilter::<AwareHash>::with_seed(1 << 20, 4, 1).unwrap();
        let mut i = 0;
        b.iter(|| {
            bf.insert(black_box(&keys[i % keys.len()]));
            i += 1;
        });
    });
}

fn bench_heavy_hitters(c: &mut Criterion) {
    let keys = keys(10_000);
    c.bench_function("space_saving_update", |b| {
        let mut ss = SpaceSaving::<u64, 13>::new(1024).unwrap();
        let mut i = 0;
        b.iter(|| {
            ss.update(black_box(&keys[i % keys.len()]), 1);
            i += 1;
        });
    });
}

fn bench_composite(c: &mut Criterion) {
    let keys = keys(10_000);
    let mut group = c.benchmark_group("composite");
    group.bench_function("elastic_update", |b| {
        let mut es =
            ElasticSketch::<u64, u16, AwareHash, 13>::with_seed(4096, 8, 3, 65536, 1).unwrap();
        let mut i = 0;
        b.iter(|| {
            es.update(black_box(&keys[i % keys.len()]), 1);
            i += 1;
        });
    });
    group.bench_function("nitro_sampled_update", |b| {
        let mut ns = NitroSketch::<i64, AwareHash>::with_seed(5, 65536, 1).unwrap();
        ns.adjust_update_prob(64.0);
        let mut i = 0;
        b.iter(|| {
            ns.always_line_rate_update(black_box(&keys[i % keys.len()]), 1);
            i += 1;
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_frequency,
    bench_membership,
    bench_heavy_hitters,
    bench_composite
);
criterion_main!(benches);
