//! Buffered streams over memory, files, or callbacks, with transparent
//! (de)compression.
//!
//! A [`StreamReader`] binds one source to at most one decoder; a
//! [`StreamWriter`] binds one destination to at most one encoder. Once a
//! stream reports an error, every further operation on it fails
//! immediately. Writers opened with [`WriteFlags::atomic`] commit through
//! a temp-file-plus-rename so readers never observe a partial file.

mod deflate;
mod dest;
mod error;
mod inflate;
mod reader;
mod source;
mod splice;
mod writer;

pub use dest::WriteFlags;
pub use error::{Result, StreamError};
pub use reader::StreamReader;
pub use splice::splice;
pub use writer::StreamWriter;

use crate::util::size::kb;

/// Codec applied on top of the raw source or destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionType {
    /// Raw bytes, no transcoding
    #[default]
    None,
    /// RFC 1952 framing with Deflate body
    Gzip,
    /// RFC 1950 framing with Deflate body
    Zlib,
    /// Brotli default framing
    Brotli,
    /// LZ4 frame format
    Lz4,
}

/// Speed/ratio preset for encoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionSpeed {
    /// Balanced (Deflate level 6, Brotli quality 6)
    #[default]
    Default,
    /// Favor throughput (Deflate level 1, Brotli quality 0)
    Fast,
    /// Favor ratio (Deflate level 9, Brotli quality 11)
    Slow,
}

impl CompressionSpeed {
    /// Deflate compression level for this preset.
    pub(crate) fn deflate_level(self) -> flate2::Compression {
        match self {
            Self::Default => flate2::Compression::new(6),
            Self::Fast => flate2::Compression::new(1),
            Self::Slow => flate2::Compression::new(9),
        }
    }

    /// Brotli quality for this preset.
    pub(crate) fn brotli_quality(self) -> u32 {
        match self {
            Self::Default => 6,
            Self::Fast => 0,
            Self::Slow => 11,
        }
    }
}

/// Input buffer size for the inflate path.
pub(crate) const INPUT_BUFFER_SIZE: usize = kb(256);

/// Buffer size handed to the Brotli adapters.
pub(crate) const BROTLI_BUFFER_SIZE: usize = kb(256);

/// Brotli window size (log2).
pub(crate) const BROTLI_LGWIN: u32 = 22;

/// Writes below this size coalesce before hitting the deflate encoder.
pub(crate) const SMALL_WRITE_SIZE: usize = 512;

/// Hard cap on the total Gzip header size (magic through FHCRC).
pub(crate) const GZIP_HEADER_MAX: usize = 4096;
