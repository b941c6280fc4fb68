//! Compress every file given on the command line in parallel.
//!
//! Run with: cargo run --example parallel_compress -- FILE...

use bedrock::{
    Async, CompressionSpeed, CompressionType, StreamReader, StreamWriter, TaskPool, WriteFlags,
};

fn main() {
    env_logger::init();

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        eprintln!("Usage: parallel_compress FILE...");
        std::process::exit(1);
    }

    let pool = TaskPool::with_default_threads();
    let batch = Async::stop_on_error(&pool);

    for path in paths {
        batch.run(move |_ctx| compress_one(&path));
    }

    let ok = batch.sync();
    drop(pool);
    std::process::exit(if ok { 0 } else { 1 });
}

fn compress_one(path: &str) -> bool {
    let mut reader = match StreamReader::open(path, CompressionType::None) {
        Ok(reader) => reader,
        Err(err) => {
            eprintln!("{err}");
            return false;
        }
    };

    let out = format!("{path}.gz");
    let mut writer = match StreamWriter::create(
        &out,
        WriteFlags::atomic(),
        CompressionType::Gzip,
        CompressionSpeed::Default,
    ) {
        Ok(writer) => writer,
        Err(err) => {
            eprintln!("{err}");
            return false;
        }
    };

    let result = bedrock::splice(&mut reader, None, &mut writer).and_then(|copied| {
        writer.close()?;
        Ok(copied)
    });

    match result {
        Ok(copied) => {
            println!(
                "{path}: {} -> {}",
                bedrock::format_bytes(copied),
                bedrock::format_bytes(writer.bytes_written())
            );
            true
        }
        Err(err) => {
            eprintln!("{err}");
            false
        }
    }
}
