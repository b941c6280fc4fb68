//! Buffered reader over memory, files, or pull callbacks.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use crate::stream::error::{Result, StreamError};
use crate::stream::inflate::InflateDecoder;
use crate::stream::source::{RawSource, SharedSource, Source, SourceHandle};
use crate::stream::{CompressionType, BROTLI_BUFFER_SIZE};
use crate::sync::mutex::Mutex;
use crate::util::size::{format_bytes, kb, mb};

enum Decoder {
    None,
    Inflate(Box<InflateDecoder>),
    Brotli(Box<brotli::Decompressor<SourceHandle>>),
    Lz4(Box<lz4_flex::frame::FrameDecoder<SourceHandle>>),
}

/// Streaming reader with optional transparent decompression.
///
/// Once any operation fails, the reader latches its error flag and every
/// later call returns [`StreamError::Faulted`] immediately.
///
/// # Example
///
/// ```
/// use bedrock::{CompressionType, StreamReader};
///
/// let mut reader = StreamReader::from_memory(b"hello".to_vec(), CompressionType::None);
/// let data = reader.read_all(1024).unwrap();
/// assert_eq!(data, b"hello");
/// assert!(reader.is_eof());
/// ```
pub struct StreamReader {
    filename: String,
    compression: CompressionType,
    raw: SharedSource,
    decoder: Decoder,
    error: bool,
    eof: bool,
}

impl StreamReader {
    /// Read from an in-memory buffer.
    pub fn from_memory(buf: impl Into<Vec<u8>>, compression: CompressionType) -> Self {
        Self::build(
            Source::Memory {
                buf: buf.into(),
                pos: 0,
            },
            "<memory>",
            compression,
        )
    }

    /// Read from an already-open file. The handle is owned from here on.
    pub fn from_file(file: File, filename: &str, compression: CompressionType) -> Self {
        Self::build(Source::File(file), filename, compression)
    }

    /// Open `path` for reading.
    pub fn open(path: impl AsRef<Path>, compression: CompressionType) -> Result<Self> {
        let path = path.as_ref();
        let filename = path.display().to_string();

        let file = File::open(path).map_err(|err| {
            log::error!("Failed to open '{}' for reading: {}", filename, err);
            StreamError::io(&filename, err)
        })?;

        Ok(Self::build(Source::File(file), &filename, compression))
    }

    /// Read from a pull callback: `read(buf)` returns how many bytes it
    /// produced, with 0 meaning end of stream.
    pub fn from_callback(
        read: impl FnMut(&mut [u8]) -> io::Result<usize> + Send + 'static,
        filename: &str,
        compression: CompressionType,
    ) -> Self {
        Self::build(Source::Callback(Box::new(read)), filename, compression)
    }

    fn build(source: Source, filename: &str, compression: CompressionType) -> Self {
        let raw = Arc::new(Mutex::new(RawSource::new(source)));
        let decoder = Self::make_decoder(compression, &raw, filename);

        Self {
            filename: filename.to_owned(),
            compression,
            raw,
            decoder,
            error: false,
            eof: false,
        }
    }

    fn make_decoder(
        compression: CompressionType,
        raw: &SharedSource,
        filename: &str,
    ) -> Decoder {
        match compression {
            CompressionType::None => Decoder::None,
            CompressionType::Gzip => Decoder::Inflate(Box::new(InflateDecoder::new(true, filename))),
            CompressionType::Zlib => {
                Decoder::Inflate(Box::new(InflateDecoder::new(false, filename)))
            }
            CompressionType::Brotli => Decoder::Brotli(Box::new(brotli::Decompressor::new(
                SourceHandle(raw.clone()),
                BROTLI_BUFFER_SIZE,
            ))),
            CompressionType::Lz4 => Decoder::Lz4(Box::new(lz4_flex::frame::FrameDecoder::new(
                SourceHandle(raw.clone()),
            ))),
        }
    }

    /// Read decoded bytes into `buf`.
    ///
    /// Returns how many bytes were produced; 0 only at end of stream (or
    /// for an empty `buf`). Short reads before EOF are possible.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.error {
            return Err(StreamError::Faulted(self.filename.clone()));
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let result = match &mut self.decoder {
            Decoder::None => {
                let mut raw = self.raw.lock();
                match raw.read(buf) {
                    Ok(len) => {
                        let eof = raw.eof();
                        drop(raw);
                        self.eof = eof;
                        Ok(len)
                    }
                    Err(err) => {
                        log::error!("Failed to read from '{}': {}", self.filename, err);
                        Err(StreamError::io(&self.filename, err))
                    }
                }
            }
            Decoder::Inflate(decoder) => match decoder.read(&self.raw, buf) {
                Ok((len, eof)) => {
                    self.eof = eof;
                    Ok(len)
                }
                Err(err) => Err(err),
            },
            Decoder::Brotli(decoder) => {
                Self::read_adapter(&mut **decoder, buf, &self.filename, &mut self.eof)
            }
            Decoder::Lz4(decoder) => {
                Self::read_adapter(&mut **decoder, buf, &self.filename, &mut self.eof)
            }
        };

        if result.is_err() {
            self.error = true;
        }
        result
    }

    /// Shared path for codecs driven through `io::Read` adapters.
    fn read_adapter(
        decoder: &mut impl Read,
        buf: &mut [u8],
        filename: &str,
        eof: &mut bool,
    ) -> Result<usize> {
        match decoder.read(buf) {
            Ok(0) => {
                *eof = true;
                Ok(0)
            }
            Ok(len) => Ok(len),
            Err(err) => match err.kind() {
                io::ErrorKind::UnexpectedEof => {
                    log::error!("Truncated compressed stream in '{}'", filename);
                    Err(StreamError::TruncatedStream(filename.to_owned()))
                }
                io::ErrorKind::InvalidData => {
                    log::error!("Malformed compressed data in '{}'", filename);
                    Err(StreamError::CorruptData(filename.to_owned()))
                }
                _ => {
                    log::error!("Failed to read from '{}': {}", filename, err);
                    Err(StreamError::io(filename, err))
                }
            },
        }
    }

    /// Read the whole stream, bounded by `max_len` bytes of output.
    ///
    /// Uncompressed streams with a known raw length are read in one exact
    /// pass; everything else (compressed streams, pseudo-files reporting a
    /// zero length) grows the buffer geometrically until EOF, treating a
    /// breach of `max_len` as an error so untrusted input cannot balloon
    /// memory use.
    pub fn read_all(&mut self, max_len: u64) -> Result<Vec<u8>> {
        if self.error {
            return Err(StreamError::Faulted(self.filename.clone()));
        }

        let raw_len = match self.compression {
            CompressionType::None => self.raw.lock().raw_len().filter(|&len| len > 0),
            _ => None,
        };

        if let Some(len) = raw_len {
            if len > max_len {
                return Err(self.too_large(max_len));
            }

            // One byte of headroom: the final read lands in the spare
            // byte, returns 0 and latches EOF instead of stopping exactly
            // at the reported length
            let mut buf = vec![0u8; len as usize + 1];
            let mut total = 0;
            while !self.eof && total < buf.len() {
                total += self.read(&mut buf[total..])?;
            }
            if total as u64 > max_len {
                // The source grew past its reported length
                return Err(self.too_large(max_len));
            }
            buf.truncate(total);
            Ok(buf)
        } else {
            let mut buf = Vec::new();
            let mut total = 0usize;

            while !self.eof {
                let grow = if total == 0 { kb(64) } else { mb(1) };
                buf.resize(total + grow, 0);

                let len = self.read(&mut buf[total..])?;
                if total as u64 + len as u64 > max_len {
                    return Err(self.too_large(max_len));
                }
                total += len;
            }

            buf.truncate(total);
            Ok(buf)
        }
    }

    fn too_large(&mut self, max_len: u64) -> StreamError {
        log::error!(
            "File '{}' is too large (limit = {})",
            self.filename,
            format_bytes(max_len)
        );
        self.error = true;
        StreamError::TooLarge {
            filename: self.filename.clone(),
            limit: format_bytes(max_len),
        }
    }

    /// Seek back to the start of the stream and reset the decoder.
    ///
    /// Fails for callback sources, which cannot seek.
    pub fn rewind(&mut self) -> Result<()> {
        if self.error {
            return Err(StreamError::Faulted(self.filename.clone()));
        }

        let rewound = self.raw.lock().rewind().map_err(|err| {
            log::error!("Failed to rewind '{}': {}", self.filename, err);
            self.error = true;
            StreamError::io(&self.filename, err)
        })?;
        if !rewound {
            log::error!("Cannot rewind stream '{}'", self.filename);
            self.error = true;
            return Err(StreamError::CannotRewind(self.filename.clone()));
        }

        self.decoder = Self::make_decoder(self.compression, &self.raw, &self.filename);
        self.eof = false;

        Ok(())
    }

    /// Final success/failure signal for the whole stream lifetime.
    pub fn close(mut self) -> Result<()> {
        if self.error {
            Err(StreamError::Faulted(std::mem::take(&mut self.filename)))
        } else {
            Ok(())
        }
    }

    /// False once any operation has failed.
    pub fn is_valid(&self) -> bool {
        !self.error
    }

    /// True once the decoded stream is fully consumed.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Diagnostic name for this stream.
    pub fn file_name(&self) -> &str {
        &self.filename
    }

    /// Raw (pre-decompression) bytes pulled from the source so far.
    pub fn raw_read(&self) -> u64 {
        self.raw.lock().bytes_read()
    }

    /// Total raw source length, when knowable.
    pub fn raw_len(&self) -> Option<u64> {
        self.raw.lock().raw_len()
    }

    /// Codec this reader was opened with.
    pub fn compression(&self) -> CompressionType {
        self.compression
    }
}
