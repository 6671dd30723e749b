use blake3_stream::{Hasher, hash};
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use tracing_subscriber::EnvFilter;

const SIZES: &[usize] = &[64, 1024, 8 * 1024, 1024 * 1024];

fn pattern(n: usize) -> Vec<u8> {
    (0..n).map(|i| (i % 251) as u8).collect()
}

fn criterion_benchmark(c: &mut Criterion) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
    tracing::info!(backend = blake3_stream::detected_backend_name(), "hashing backend selected");

    for &size in SIZES {
        let input = pattern(size);

        c.bench_function(&format!("{size}/one-shot"), |b| {
            b.iter(|| black_box(hash(black_box(&input))));
        });

        c.bench_function(&format!("{size}/streaming"), |b| {
            b.iter(|| {
                let mut hasher = Hasher::new();
                hasher.update(black_box(&input));
                black_box(hasher.finalize())
            });
        });
    }

    // Chunked feeding exercises the SIMD batch path in `Hasher::update` once
    // several complete chunks are available at once.
    let many_chunks = pattern(64 * 1024);
    c.bench_function("65536/streaming-in-4096-byte-pieces", |b| {
        b.iter(|| {
            let mut hasher = Hasher::new();
            for piece in many_chunks.chunks(4096) {
                hasher.update(black_box(piece));
            }
            black_box(hasher.finalize())
        });
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
