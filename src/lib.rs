//! # bedrock
//!
//! Foundation services for data-heavy tools: arena memory, compressed
//! streams, and batch scheduling.
//!
//! ## Features
//!
//! - Block arena (bump allocation over fixed-size buckets, with a
//!   separate path for large objects)
//! - Buffered stream readers/writers over memory, files, or callbacks
//! - Transparent Gzip, Zlib, Brotli, and LZ4 (de)compression
//! - Atomic file writes (temp file + rename, never a partial file)
//! - Work-stealing task pool with fallible batches
//!
//! ## Quick Start
//!
//! ```rust
//! use bedrock::{CompressionSpeed, CompressionType, StreamReader, StreamWriter};
//!
//! let mut writer = StreamWriter::to_memory(CompressionType::Gzip, CompressionSpeed::Default);
//! writer.write(b"some payload").unwrap();
//! let compressed = writer.finish().unwrap();
//!
//! let mut reader = StreamReader::from_memory(compressed, CompressionType::Gzip);
//! assert_eq!(reader.read_all(1024).unwrap(), b"some payload");
//! ```

pub mod arena;
pub mod stream;
pub mod task;

mod sync;
mod util;

pub use arena::{ArenaConfig, BlockArena, LinkedAllocator};
pub use stream::{
    splice, CompressionSpeed, CompressionType, StreamError, StreamReader, StreamWriter, WriteFlags,
};
pub use task::{Async, TaskPool, WorkerContext};
pub use util::size::{format_bytes, kb, mb};
