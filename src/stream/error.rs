//! Stream error taxonomy.
//!
//! Every recoverable stream failure logs a descriptive message at the
//! point of failure and surfaces one of these variants; the stream then
//! latches its error flag so later calls fail fast.

use std::io;

use thiserror::Error;

/// Result alias for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;

/// Errors reported by [`StreamReader`](crate::stream::StreamReader) and
/// [`StreamWriter`](crate::stream::StreamWriter).
#[derive(Debug, Error)]
pub enum StreamError {
    /// Underlying I/O failure (file, callback, or OS error).
    #[error("I/O error on '{filename}': {source}")]
    Io {
        filename: String,
        #[source]
        source: io::Error,
    },

    /// The stream does not start with a valid header for its codec.
    #[error("File '{0}' does not look like a valid compressed stream")]
    MalformedHeader(String),

    /// Gzip header longer than the supported 4096 bytes.
    ///
    /// Known limit: headers with very large extra fields are rejected
    /// rather than buffered.
    #[error("Gzip header in '{0}' exceeds the 4096 byte limit")]
    OversizedHeader(String),

    /// Compressed data failed to decode.
    #[error("Malformed compressed data in '{0}'")]
    CorruptData(String),

    /// Gzip trailer CRC32 or length does not match the decoded data.
    #[error("Failed CRC32 check in '{0}'")]
    TrailerMismatch(String),

    /// Source ended before the compressed stream did.
    #[error("Truncated compressed stream in '{0}'")]
    TruncatedStream(String),

    /// Encoder failed to compress data.
    #[error("Failed to compress data for '{0}'")]
    EncodeFailed(String),

    /// Size ceiling exceeded while reading or splicing.
    #[error("File '{filename}' is too large (limit = {limit})")]
    TooLarge { filename: String, limit: String },

    /// Rewind requested on a source that cannot seek.
    #[error("Cannot rewind stream '{0}'")]
    CannotRewind(String),

    /// Destination opened with the exclusive flag already exists.
    #[error("File '{0}' already exists")]
    AlreadyExists(String),

    /// Operation on a stream whose error flag is already set.
    #[error("Stream '{0}' is in error state")]
    Faulted(String),
}

impl StreamError {
    pub(crate) fn io(filename: &str, source: io::Error) -> Self {
        Self::Io {
            filename: filename.to_owned(),
            source,
        }
    }
}
