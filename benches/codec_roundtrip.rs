//! Codec throughput benchmarks for the per-channel compression paths.

use bytes::Bytes;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use pulsewire::compression::{compress_data, decompress_data};
use pulsewire::{ChannelConfig, ChannelType, Compression, ScratchAllocator};

fn waveform(elements: usize) -> Bytes {
    let raw: Vec<u8> = (0..elements)
        .flat_map(|i| ((i as f64).sin() * 1000.0).to_le_bytes())
        .collect();
    Bytes::from(raw)
}

fn config(elements: usize, compression: Compression) -> ChannelConfig {
    ChannelConfig::array("wave", ChannelType::Float64, vec![elements])
        .with_compression(compression)
}

fn bench_compress(c: &mut Criterion) {
    let mut group = c.benchmark_group("compress");
    for elements in [256usize, 4096, 65536] {
        let payload = waveform(elements);
        group.throughput(Throughput::Bytes(payload.len() as u64));
        for codec in [Compression::Lz4, Compression::BitshuffleLz4] {
            let cfg = config(elements, codec);
            let mut alloc = ScratchAllocator::new();
            group.bench_with_input(
                BenchmarkId::new(codec.name(), elements),
                &payload,
                |b, payload| {
                    b.iter(|| compress_data(&cfg, payload, &mut alloc).unwrap());
                },
            );
        }
    }
    group.finish();
}

fn bench_decompress(c: &mut Criterion) {
    let mut group = c.benchmark_group("decompress");
    for elements in [256usize, 4096, 65536] {
        let payload = waveform(elements);
        group.throughput(Throughput::Bytes(payload.len() as u64));
        for codec in [Compression::Lz4, Compression::BitshuffleLz4] {
            let cfg = config(elements, codec);
            let mut alloc = ScratchAllocator::new();
            let compressed = compress_data(&cfg, &payload, &mut alloc).unwrap();
            group.bench_with_input(
                BenchmarkId::new(codec.name(), elements),
                &compressed,
                |b, compressed| {
                    b.iter(|| decompress_data(&cfg, compressed, &mut alloc).unwrap());
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_compress, bench_decompress);
criterion_main!(benches);
