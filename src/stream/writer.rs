//! Buffered writer over memory, files, or push callbacks.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use crate::stream::deflate::DeflateEncoder;
use crate::stream::dest::{DestHandle, Destination, RawDest, SharedDest, WriteFlags};
use crate::stream::error::{Result, StreamError};
use crate::stream::{CompressionSpeed, CompressionType, BROTLI_BUFFER_SIZE, BROTLI_LGWIN};
use crate::sync::mutex::Mutex;

enum Encoder {
    None,
    Deflate(Box<DeflateEncoder>),
    Brotli(Box<brotli::CompressorWriter<DestHandle>>),
    Lz4(Box<lz4_flex::frame::FrameEncoder<DestHandle>>),
}

/// Streaming writer with optional transparent compression.
///
/// Write failures are sticky: after the first error every later call
/// fails with [`StreamError::Faulted`]. A writer must be finished with
/// [`close`](Self::close) (or [`finish`](Self::finish) for memory
/// destinations); atomic file destinations only replace the target at
/// that point, so an aborted writer never leaves a partial file behind.
///
/// # Example
///
/// ```
/// use bedrock::{CompressionSpeed, CompressionType, StreamWriter};
///
/// let mut writer = StreamWriter::to_memory(CompressionType::Gzip, CompressionSpeed::Default);
/// writer.write(b"hello").unwrap();
/// let compressed = writer.finish().unwrap();
/// assert!(compressed.starts_with(&[0x1F, 0x8B]));
/// ```
pub struct StreamWriter {
    filename: String,
    raw: SharedDest,
    encoder: Encoder,
    error: bool,
    closed: bool,
}

impl StreamWriter {
    /// Write into an in-memory buffer, retrieved with [`finish`](Self::finish).
    pub fn to_memory(compression: CompressionType, speed: CompressionSpeed) -> Self {
        Self::build(
            RawDest::new(Destination::Memory(Vec::new())),
            "<memory>",
            compression,
            speed,
        )
    }

    /// Create (or atomically replace) the file at `path`.
    pub fn create(
        path: impl AsRef<Path>,
        flags: WriteFlags,
        compression: CompressionType,
        speed: CompressionSpeed,
    ) -> Result<Self> {
        let path = path.as_ref();
        let filename = path.display().to_string();

        let raw = RawDest::create_file(path, flags).map_err(|err| {
            log::error!("Failed to open '{}' for writing: {}", filename, err);
            if err.kind() == io::ErrorKind::AlreadyExists {
                StreamError::AlreadyExists(filename.clone())
            } else {
                StreamError::io(&filename, err)
            }
        })?;

        Ok(Self::build(raw, &filename, compression, speed))
    }

    /// Write to an already-open file. The handle is owned from here on.
    pub fn to_file(
        file: File,
        filename: &str,
        compression: CompressionType,
        speed: CompressionSpeed,
    ) -> Self {
        Self::build(
            RawDest::new(Destination::File(file)),
            filename,
            compression,
            speed,
        )
    }

    /// Write through a push callback receiving each encoded chunk.
    pub fn to_callback(
        write: impl FnMut(&[u8]) -> io::Result<()> + Send + 'static,
        filename: &str,
        compression: CompressionType,
        speed: CompressionSpeed,
    ) -> Self {
        Self::build(
            RawDest::new(Destination::Callback(Box::new(write))),
            filename,
            compression,
            speed,
        )
    }

    fn build(
        raw: RawDest,
        filename: &str,
        compression: CompressionType,
        speed: CompressionSpeed,
    ) -> Self {
        let raw = Arc::new(Mutex::new(raw));

        let encoder = match compression {
            CompressionType::None => Encoder::None,
            CompressionType::Gzip => {
                Encoder::Deflate(Box::new(DeflateEncoder::new(true, speed, filename)))
            }
            CompressionType::Zlib => {
                Encoder::Deflate(Box::new(DeflateEncoder::new(false, speed, filename)))
            }
            CompressionType::Brotli => Encoder::Brotli(Box::new(brotli::CompressorWriter::new(
                DestHandle(raw.clone()),
                BROTLI_BUFFER_SIZE,
                speed.brotli_quality(),
                BROTLI_LGWIN,
            ))),
            // LZ4 frame encoding has no meaningful speed knob
            CompressionType::Lz4 => Encoder::Lz4(Box::new(lz4_flex::frame::FrameEncoder::new(
                DestHandle(raw.clone()),
            ))),
        };

        Self {
            filename: filename.to_owned(),
            raw,
            encoder,
            error: false,
            closed: false,
        }
    }

    /// Encode and push `buf` to the destination.
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        if self.error || self.closed {
            return Err(StreamError::Faulted(self.filename.clone()));
        }
        if buf.is_empty() {
            return Ok(());
        }

        let result = match &mut self.encoder {
            Encoder::None => self.raw.lock().write_all(buf).map_err(|err| {
                log::error!("Failed to write to '{}': {}", self.filename, err);
                StreamError::io(&self.filename, err)
            }),
            Encoder::Deflate(encoder) => encoder.write(&self.raw, buf),
            Encoder::Brotli(encoder) => {
                Self::write_adapter(&mut **encoder, buf, &self.filename)
            }
            Encoder::Lz4(encoder) => Self::write_adapter(&mut **encoder, buf, &self.filename),
        };

        if result.is_err() {
            self.error = true;
        }
        result
    }

    fn write_adapter(encoder: &mut impl Write, buf: &[u8], filename: &str) -> Result<()> {
        encoder.write_all(buf).map_err(|err| {
            log::error!("Failed to write to '{}': {}", filename, err);
            StreamError::io(filename, err)
        })
    }

    /// Finalize the stream: flush the encoder's trailer and, for atomic
    /// file destinations, rename the temp file into place.
    ///
    /// Idempotent: a second call reports the outcome of the first. On any
    /// failure the destination is aborted, leaving atomic targets untouched.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return if self.error {
                Err(StreamError::Faulted(self.filename.clone()))
            } else {
                Ok(())
            };
        }
        if self.error {
            self.closed = true;
            self.raw.lock().abort();
            return Err(StreamError::Faulted(self.filename.clone()));
        }
        self.closed = true;

        let result = self.close_impl();
        if result.is_err() {
            self.error = true;
            self.raw.lock().abort();
        }
        result
    }

    fn close_impl(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.encoder, Encoder::None) {
            Encoder::None => {}
            Encoder::Deflate(mut encoder) => encoder.finish(&self.raw)?,
            Encoder::Brotli(mut encoder) => {
                // The Brotli trailer is emitted when the writer drops;
                // trailer write failures surface through the shared
                // destination's error flag, checked below
                encoder.flush().map_err(|err| {
                    log::error!("Failed to compress data for '{}': {}", self.filename, err);
                    StreamError::EncodeFailed(self.filename.clone())
                })?;
            }
            Encoder::Lz4(encoder) => {
                encoder.finish().map_err(|err| {
                    log::error!("Failed to compress data for '{}': {}", self.filename, err);
                    StreamError::EncodeFailed(self.filename.clone())
                })?;
            }
        }

        let mut raw = self.raw.lock();
        if raw.failed() {
            log::error!("Failed to write to '{}'", self.filename);
            return Err(StreamError::io(
                &self.filename,
                io::Error::new(io::ErrorKind::Other, "write failed"),
            ));
        }

        raw.commit().map_err(|err| {
            log::error!("Failed to finalize '{}': {}", self.filename, err);
            if err.kind() == io::ErrorKind::AlreadyExists {
                StreamError::AlreadyExists(self.filename.clone())
            } else {
                StreamError::io(&self.filename, err)
            }
        })
    }

    /// Close the stream and return the accumulated buffer of a memory
    /// destination (empty for other destinations).
    pub fn finish(&mut self) -> Result<Vec<u8>> {
        self.close()?;
        Ok(self.raw.lock().take_memory().unwrap_or_default())
    }

    /// False once any operation has failed.
    pub fn is_valid(&self) -> bool {
        !self.error
    }

    /// Diagnostic name for this stream.
    pub fn file_name(&self) -> &str {
        &self.filename
    }

    /// Encoded bytes pushed to the destination so far. Compressors
    /// buffer internally, so this lags behind what was written until
    /// [`close`](Self::close).
    pub fn bytes_written(&self) -> u64 {
        self.raw.lock().bytes_written()
    }
}

impl Drop for StreamWriter {
    fn drop(&mut self) {
        if !self.closed && self.close().is_err() {
            log::error!("Failed to close '{}' cleanly", self.filename);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamReader;

    #[test]
    fn test_memory_uncompressed() {
        let mut writer = StreamWriter::to_memory(CompressionType::None, CompressionSpeed::Default);
        writer.write(b"hello ").unwrap();
        writer.write(b"world").unwrap();
        assert_eq!(writer.bytes_written(), 11);
        assert_eq!(writer.finish().unwrap(), b"hello world");
    }

    #[test]
    fn test_close_idempotent() {
        let mut writer = StreamWriter::to_memory(CompressionType::Gzip, CompressionSpeed::Default);
        writer.write(b"data").unwrap();
        writer.close().unwrap();
        writer.close().unwrap();
        assert!(matches!(writer.write(b"x"), Err(StreamError::Faulted(_))));
    }

    #[test]
    fn test_callback_failure_is_sticky() {
        let mut writer = StreamWriter::to_callback(
            |_| Err(io::Error::new(io::ErrorKind::Other, "sink closed")),
            "<callback>",
            CompressionType::None,
            CompressionSpeed::Default,
        );

        assert!(writer.write(b"data").is_err());
        assert!(!writer.is_valid());
        assert!(matches!(writer.write(b"more"), Err(StreamError::Faulted(_))));
        assert!(matches!(writer.close(), Err(StreamError::Faulted(_))));
    }

    #[test]
    fn test_gzip_round_trip() {
        let mut writer = StreamWriter::to_memory(CompressionType::Gzip, CompressionSpeed::Default);
        writer.write(b"the quick brown fox").unwrap();
        let compressed = writer.finish().unwrap();
        assert!(compressed.starts_with(&[0x1F, 0x8B, 8]));

        let mut reader = StreamReader::from_memory(compressed, CompressionType::Gzip);
        assert_eq!(reader.read_all(1024).unwrap(), b"the quick brown fox");
        assert!(reader.is_eof());
    }

    #[test]
    fn test_atomic_create_and_abort() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");

        // Committed writer produces the file
        let mut writer = StreamWriter::create(
            &path,
            WriteFlags::atomic(),
            CompressionType::None,
            CompressionSpeed::Default,
        )
        .unwrap();
        writer.write(b"payload").unwrap();
        writer.close().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"payload");

        // Exclusive refuses to clobber it
        assert!(matches!(
            StreamWriter::create(
                &path,
                WriteFlags::exclusive(),
                CompressionType::None,
                CompressionSpeed::Default,
            ),
            Err(StreamError::AlreadyExists(_))
        ));

        // A dropped-without-close writer commits on drop; no temp files linger
        let other = dir.path().join("other.bin");
        {
            let mut writer = StreamWriter::create(
                &other,
                WriteFlags::atomic(),
                CompressionType::None,
                CompressionSpeed::Default,
            )
            .unwrap();
            writer.write(b"late").unwrap();
        }
        assert_eq!(std::fs::read(&other).unwrap(), b"late");

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
