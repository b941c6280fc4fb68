//! End-to-end tests crossing the stream, arena, and task layers.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use rand::{Rng, SeedableRng};

use bedrock::{
    splice, Async, CompressionSpeed, CompressionType, StreamError, StreamReader, StreamWriter,
    TaskPool, WriteFlags,
};

const CODECS: [CompressionType; 5] = [
    CompressionType::None,
    CompressionType::Gzip,
    CompressionType::Zlib,
    CompressionType::Brotli,
    CompressionType::Lz4,
];

fn round_trip(data: &[u8], compression: CompressionType, speed: CompressionSpeed) {
    let mut writer = StreamWriter::to_memory(compression, speed);
    writer.write(data).unwrap();
    let encoded = writer.finish().unwrap();

    let mut reader = StreamReader::from_memory(encoded, compression);
    let decoded = reader.read_all(data.len() as u64 + 1024).unwrap();
    assert_eq!(decoded, data, "{compression:?} round trip mismatch");
    assert!(reader.is_eof());
    reader.close().unwrap();
}

#[test]
fn test_round_trip_empty() {
    for compression in CODECS {
        round_trip(&[], compression, CompressionSpeed::Default);
    }
}

#[test]
fn test_round_trip_one_byte() {
    for compression in CODECS {
        round_trip(b"x", compression, CompressionSpeed::Default);
    }
}

#[test]
fn test_round_trip_repetitive() {
    // 1 MiB of the same byte, per codec and speed preset
    let data = vec![0x42u8; 1 << 20];
    for compression in CODECS {
        for speed in [
            CompressionSpeed::Fast,
            CompressionSpeed::Default,
            CompressionSpeed::Slow,
        ] {
            round_trip(&data, compression, speed);
        }
    }
}

#[test]
fn test_round_trip_random() {
    // 1 MiB of incompressible data; Slow is skipped here because its
    // cost on random input dwarfs the rest of the suite
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x5EED);
    let data: Vec<u8> = (0..1 << 20).map(|_| rng.gen()).collect();

    for compression in CODECS {
        for speed in [CompressionSpeed::Fast, CompressionSpeed::Default] {
            round_trip(&data, compression, speed);
        }
    }
}

#[test]
fn test_round_trip_many_small_writes() {
    let mut writer = StreamWriter::to_memory(CompressionType::Gzip, CompressionSpeed::Default);
    for chunk_idx in 0..10_000u32 {
        writer.write(&chunk_idx.to_le_bytes()).unwrap();
    }
    let encoded = writer.finish().unwrap();

    let mut reader = StreamReader::from_memory(encoded, CompressionType::Gzip);
    let decoded = reader.read_all(1 << 20).unwrap();
    assert_eq!(decoded.len(), 40_000);
    for (chunk_idx, chunk) in decoded.chunks_exact(4).enumerate() {
        assert_eq!(chunk, (chunk_idx as u32).to_le_bytes());
    }
}

#[test]
fn test_gzip_detects_corruption() {
    let mut writer = StreamWriter::to_memory(CompressionType::Gzip, CompressionSpeed::Default);
    writer.write(b"precious payload bytes").unwrap();
    let mut encoded = writer.finish().unwrap();

    // Flip a bit in the CRC32 trailer
    let trailer = encoded.len() - 8;
    encoded[trailer] ^= 0x01;

    let mut reader = StreamReader::from_memory(encoded, CompressionType::Gzip);
    assert!(matches!(
        reader.read_all(1024),
        Err(StreamError::TrailerMismatch(_))
    ));
}

#[test]
fn test_gzip_interoperates_with_flate2() {
    // Our encoder's output must decode with an off-the-shelf gzip reader
    let mut writer = StreamWriter::to_memory(CompressionType::Gzip, CompressionSpeed::Default);
    writer.write(b"cross-checked").unwrap();
    let encoded = writer.finish().unwrap();

    let mut decoded = Vec::new();
    std::io::Read::read_to_end(
        &mut flate2::read::GzDecoder::new(encoded.as_slice()),
        &mut decoded,
    )
    .unwrap();
    assert_eq!(decoded, b"cross-checked");

    // And the other direction
    let mut encoder =
        flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    std::io::Write::write_all(&mut encoder, b"cross-checked").unwrap();
    let foreign = encoder.finish().unwrap();

    let mut reader = StreamReader::from_memory(foreign, CompressionType::Gzip);
    assert_eq!(reader.read_all(1024).unwrap(), b"cross-checked");
}

#[test]
fn test_file_round_trip_atomic() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("archive.gz");
    let data = b"file payload".repeat(1000);

    let mut writer = StreamWriter::create(
        &path,
        WriteFlags::atomic(),
        CompressionType::Gzip,
        CompressionSpeed::Default,
    )
    .unwrap();
    writer.write(&data).unwrap();
    writer.close().unwrap();

    let mut reader = StreamReader::open(&path, CompressionType::Gzip).unwrap();
    assert_eq!(reader.read_all(1 << 20).unwrap(), data);

    // Rewind re-decodes from the start
    reader.rewind().unwrap();
    assert_eq!(reader.read_all(1 << 20).unwrap(), data);
}

#[test]
fn test_atomic_write_invisible_until_close() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("archive.bin");

    let mut writer = StreamWriter::create(
        &path,
        WriteFlags::atomic(),
        CompressionType::None,
        CompressionSpeed::Default,
    )
    .unwrap();
    writer.write(b"payload").unwrap();

    // Nothing at the destination until the writer commits
    assert!(!path.exists());
    writer.close().unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), b"payload");

    // Exclusive re-create is refused and must not clobber the file
    assert!(matches!(
        StreamWriter::create(
            &path,
            WriteFlags::exclusive(),
            CompressionType::None,
            CompressionSpeed::Default,
        ),
        Err(StreamError::AlreadyExists(_))
    ));
    assert_eq!(std::fs::read(&path).unwrap(), b"payload");
}

#[test]
fn test_failed_atomic_close_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contested.bin");

    let mut writer = StreamWriter::create(
        &path,
        WriteFlags::exclusive(),
        CompressionType::None,
        CompressionSpeed::Default,
    )
    .unwrap();
    writer.write(b"loser").unwrap();

    // Another process wins the race for the destination
    std::fs::write(&path, b"winner").unwrap();

    assert!(matches!(
        writer.close(),
        Err(StreamError::AlreadyExists(_))
    ));

    // The existing file is untouched and the temp file is gone
    assert_eq!(std::fs::read(&path).unwrap(), b"winner");
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_splice_with_limit_and_transcode() {
    let data: Vec<u8> = (0..200_000u32).map(|v| (v % 251) as u8).collect();

    let mut writer = StreamWriter::to_memory(CompressionType::Brotli, CompressionSpeed::Fast);
    writer.write(&data).unwrap();
    let encoded = writer.finish().unwrap();

    // Transcode Brotli -> Zlib under a generous cap
    let mut reader = StreamReader::from_memory(encoded.clone(), CompressionType::Brotli);
    let mut writer = StreamWriter::to_memory(CompressionType::Zlib, CompressionSpeed::Default);
    let copied = splice(&mut reader, Some(1 << 20), &mut writer).unwrap();
    assert_eq!(copied, data.len() as u64);

    let mut reader =
        StreamReader::from_memory(writer.finish().unwrap(), CompressionType::Zlib);
    assert_eq!(reader.read_all(1 << 20).unwrap(), data);

    // Same input under a tight cap fails
    let mut reader = StreamReader::from_memory(encoded, CompressionType::Brotli);
    let mut writer = StreamWriter::to_memory(CompressionType::None, CompressionSpeed::Default);
    assert!(matches!(
        splice(&mut reader, Some(1000), &mut writer),
        Err(StreamError::TooLarge { .. })
    ));
}

#[test]
fn test_pool_runs_each_task_once() {
    let pool = TaskPool::new(4);
    let batch = Async::new(&pool);

    let counters: Vec<Arc<AtomicU32>> = (0..100).map(|_| Arc::new(AtomicU32::new(0))).collect();
    for counter in &counters {
        let counter = counter.clone();
        batch.run(move |_ctx| {
            counter.fetch_add(1, Ordering::Relaxed);
            true
        });
    }

    assert!(batch.sync());
    for counter in &counters {
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }
}

#[test]
fn test_stop_on_error_short_circuits() {
    let pool = TaskPool::new(1);
    let batch = Async::stop_on_error(&pool);
    let ran = Arc::new(AtomicUsize::new(0));

    // Single-threaded pool runs tasks in order inside sync(), so
    // everything after the failing task must be skipped
    for task_idx in 0..50 {
        let ran = ran.clone();
        batch.run(move |_ctx| {
            ran.fetch_add(1, Ordering::Relaxed);
            task_idx != 0
        });
    }

    assert!(!batch.sync());
    assert_eq!(ran.load(Ordering::Relaxed), 1);
}

#[test]
fn test_nested_submission() {
    let pool = TaskPool::new(4);
    let outer = Async::new(&pool);
    let inner = Arc::new(Async::new(&pool));
    let hits = Arc::new(AtomicUsize::new(0));

    for _ in 0..8 {
        let inner = inner.clone();
        let hits = hits.clone();
        outer.run(move |ctx| {
            for _ in 0..4 {
                let hits = hits.clone();
                inner.run_from(ctx, move |_ctx| {
                    hits.fetch_add(1, Ordering::Relaxed);
                    true
                });
            }
            true
        });
    }

    assert!(outer.sync());
    assert!(inner.sync());
    assert_eq!(hits.load(Ordering::Relaxed), 32);
}

#[test]
fn test_parallel_compression() {
    let pool = TaskPool::new(4);
    let batch = Async::new(&pool);

    let chunks: Vec<Vec<u8>> = (0..16u8).map(|seed| vec![seed; 100_000]).collect();

    // Each task compresses one chunk into its own slot
    let slots: Vec<Arc<std::sync::Mutex<Vec<u8>>>> = (0..chunks.len())
        .map(|_| Arc::new(std::sync::Mutex::new(Vec::new())))
        .collect();

    for (chunk, slot) in chunks.iter().cloned().zip(&slots) {
        let slot = slot.clone();
        batch.run(move |_ctx| {
            let mut writer =
                StreamWriter::to_memory(CompressionType::Lz4, CompressionSpeed::Default);
            if writer.write(&chunk).is_err() {
                return false;
            }
            match writer.finish() {
                Ok(encoded) => {
                    *slot.lock().unwrap() = encoded;
                    true
                }
                Err(_) => false,
            }
        });
    }

    assert!(batch.sync());

    for (chunk, slot) in chunks.iter().zip(&slots) {
        let encoded = slot.lock().unwrap().clone();
        let mut reader = StreamReader::from_memory(encoded, CompressionType::Lz4);
        assert_eq!(&reader.read_all(1 << 20).unwrap(), chunk);
    }
}
