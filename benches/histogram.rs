//! Histogram engine and frame codec throughput.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench histogram
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use histo_supervisor::{wire, Histogram};

struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}

fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = XorShift64::new(seed);
    (0..len).map(|_| rng.next_u64() as u8).collect()
}

fn prose(len: usize) -> Vec<u8> {
    b"The quick brown fox jumps over the lazy dog. "
        .iter()
        .copied()
        .cycle()
        .take(len)
        .collect()
}

fn bench_from_bytes(c: &mut Criterion) {
    let mut group = c.benchmark_group("histogram/from_bytes");
    for &size in &[4 * 1024, 256 * 1024, 4 * 1024 * 1024] {
        group.throughput(Throughput::Bytes(size as u64));
        let text = prose(size);
        group.bench_with_input(BenchmarkId::new("prose", size), &text, |b, data| {
            b.iter(|| black_box(Histogram::from_bytes(black_box(data))))
        });
        let noise = random_bytes(size, 0x9e37_79b9_7f4a_7c15);
        group.bench_with_input(BenchmarkId::new("random", size), &noise, |b, data| {
            b.iter(|| black_box(Histogram::from_bytes(black_box(data))))
        });
    }
    group.finish();
}

fn bench_frame(c: &mut Criterion) {
    let hist = Histogram::from_bytes(&prose(64 * 1024));
    let frame = wire::encode(&hist);
    let mut group = c.benchmark_group("wire");
    group.throughput(Throughput::Bytes(wire::FRAME_LEN as u64));
    group.bench_function("encode", |b| b.iter(|| black_box(wire::encode(black_box(&hist)))));
    group.bench_function("decode", |b| {
        b.iter(|| black_box(wire::decode(black_box(&frame[..]))))
    });
    group.finish();
}

criterion_group!(benches, bench_from_bytes, bench_frame);
criterion_main!(benches);
