use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;

use resound::fingerprint::Fingerprint;
use resound::matcher::{gaussian_filter, match_fingerprints};

fn fingerprint(rng: &mut StdRng, frames: usize) -> Fingerprint {
    Fingerprint {
        version: 1,
        hashes: (0..frames).map(|_| rng.gen()).collect(),
    }
}

fn benchmark_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("matcher");
    let mut rng = StdRng::seed_from_u64(7);

    let master = fingerprint(&mut rng, 5000);
    let query = Fingerprint {
        version: 1,
        hashes: master.hashes[2000..2300].to_vec(),
    };
    group.throughput(Throughput::Elements(master.hashes.len() as u64));
    group.bench_function("match_excerpt_5000x300", |b| {
        b.iter(|| {
            let result = match_fingerprints(black_box(&master), black_box(&query));
            black_box(result).unwrap();
        });
    });

    let miss = fingerprint(&mut rng, 300);
    group.bench_function("match_miss_5000x300", |b| {
        b.iter(|| {
            let result = match_fingerprints(black_box(&master), black_box(&miss));
            black_box(result).unwrap();
        });
    });

    group.finish();
}

fn benchmark_gaussian(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(11);
    let signal: Vec<f64> = (0..4096).map(|_| rng.gen_range(0.0..32.0)).collect();

    c.bench_function("gaussian_filter_4096", |b| {
        b.iter(|| {
            let mut data = signal.clone();
            gaussian_filter(black_box(&mut data), 3.6, 5);
            black_box(data);
        });
    });
}

criterion_group!(benches, benchmark_match, benchmark_gaussian);
criterion_main!(benches);
