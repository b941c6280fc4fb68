//! Benchmarks for bedrock.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use bedrock::{
    ArenaConfig, BlockArena, CompressionSpeed, CompressionType, StreamReader, StreamWriter,
};

fn bench_block_arena(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_arena");

    group.bench_function("alloc_16b_1000x", |b| {
        b.iter(|| {
            let mut arena = BlockArena::new();
            for _ in 0..1000 {
                let ptr = arena.alloc(16);
                black_box(ptr);
            }
            arena.release_all();
        })
    });

    group.bench_function("alloc_zeroed_64b_1000x", |b| {
        b.iter(|| {
            let mut arena = BlockArena::new();
            for _ in 0..1000 {
                let ptr = arena.alloc_zeroed(64);
                black_box(ptr);
            }
            arena.release_all();
        })
    });

    group.bench_function("grow_string_in_place", |b| {
        b.iter(|| {
            let mut arena = BlockArena::with_config(ArenaConfig::default().with_block_size(65536));
            let mut ptr = arena.alloc(0);
            let mut len = 0;
            for _ in 0..512 {
                ptr = unsafe { arena.resize(ptr, len, len + 16) };
                len += 16;
            }
            black_box(ptr);
            arena.release_all();
        })
    });

    group.finish();
}

fn bench_stream_codecs(c: &mut Criterion) {
    let data = b"benchmark payload, mildly compressible, ".repeat(25_000);

    let mut group = c.benchmark_group("stream_codecs");
    group.throughput(Throughput::Bytes(data.len() as u64));

    for compression in [
        CompressionType::Gzip,
        CompressionType::Zlib,
        CompressionType::Brotli,
        CompressionType::Lz4,
    ] {
        group.bench_function(format!("encode_{compression:?}"), |b| {
            b.iter(|| {
                let mut writer = StreamWriter::to_memory(compression, CompressionSpeed::Fast);
                writer.write(&data).unwrap();
                black_box(writer.finish().unwrap())
            })
        });

        let mut writer = StreamWriter::to_memory(compression, CompressionSpeed::Fast);
        writer.write(&data).unwrap();
        let encoded = writer.finish().unwrap();

        group.bench_function(format!("decode_{compression:?}"), |b| {
            b.iter(|| {
                let mut reader = StreamReader::from_memory(encoded.clone(), compression);
                black_box(reader.read_all(u64::MAX).unwrap())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_block_arena, bench_stream_codecs);
criterion_main!(benches);
