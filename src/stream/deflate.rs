//! Deflate encoder for the Gzip and Zlib framings.
//!
//! Small writes coalesce in a fixed buffer before hitting the codec, so
//! call sites that emit many tiny fragments (formatted text, length
//! prefixes) do not pay one codec call per fragment.

use flate2::{Compress, Crc, FlushCompress, Status};

use crate::stream::dest::SharedDest;
use crate::stream::error::{Result, StreamError};
use crate::stream::{CompressionSpeed, SMALL_WRITE_SIZE};

use crate::util::size::kb;

/// RFC 1952 fixed header: magic, Deflate method, no flags, zero mtime,
/// no XFL hint, unspecified OS.
const GZIP_HEADER: [u8; 10] = [0x1F, 0x8B, 8, 0, 0, 0, 0, 0, 0, 0];

/// Streaming encoder for Gzip and Zlib destinations.
pub(crate) struct DeflateEncoder {
    filename: String,
    state: Compress,
    gzip: bool,

    header_written: bool,
    crc: Crc,

    small: Vec<u8>,
    scratch: Vec<u8>,
}

impl DeflateEncoder {
    pub(crate) fn new(gzip: bool, speed: CompressionSpeed, filename: &str) -> Self {
        Self {
            filename: filename.to_owned(),
            // Gzip framing is written here, so the body is raw Deflate;
            // Zlib framing (header + Adler32) stays in flate2
            state: Compress::new(speed.deflate_level(), !gzip),
            gzip,
            header_written: false,
            crc: Crc::new(),
            small: Vec::with_capacity(SMALL_WRITE_SIZE),
            scratch: vec![0; kb(64)],
        }
    }

    pub(crate) fn write(&mut self, raw: &SharedDest, buf: &[u8]) -> Result<()> {
        self.write_header(raw)?;

        // Coalesce small writes before paying for a codec call
        if self.small.len() + buf.len() <= SMALL_WRITE_SIZE {
            self.small.extend_from_slice(buf);
            return Ok(());
        }

        let pending = std::mem::take(&mut self.small);
        if !pending.is_empty() {
            self.deflate(raw, &pending, false)?;
        }
        self.deflate(raw, buf, false)
    }

    /// Flush buffered bytes, terminate the Deflate stream, and (for Gzip)
    /// append the little-endian CRC32 + size trailer.
    pub(crate) fn finish(&mut self, raw: &SharedDest) -> Result<()> {
        self.write_header(raw)?;

        let pending = std::mem::take(&mut self.small);
        if !pending.is_empty() {
            self.deflate(raw, &pending, false)?;
        }
        self.deflate(raw, &[], true)?;

        if self.gzip {
            let mut trailer = [0u8; 8];
            trailer[..4].copy_from_slice(&self.crc.sum().to_le_bytes());
            trailer[4..].copy_from_slice(&self.crc.amount().to_le_bytes());
            self.write_raw(raw, &trailer)?;
        }

        Ok(())
    }

    fn write_header(&mut self, raw: &SharedDest) -> Result<()> {
        if self.gzip && !self.header_written {
            self.write_raw(raw, &GZIP_HEADER)?;
            self.header_written = true;
        }
        Ok(())
    }

    fn deflate(&mut self, raw: &SharedDest, input: &[u8], finish: bool) -> Result<()> {
        if self.gzip {
            self.crc.update(input);
        }

        let flush = if finish {
            FlushCompress::Finish
        } else {
            FlushCompress::None
        };
        let mut consumed_total = 0;

        loop {
            let before_in = self.state.total_in();
            let before_out = self.state.total_out();

            let status = self
                .state
                .compress(&input[consumed_total..], &mut self.scratch, flush)
                .map_err(|_| {
                    log::error!("Failed to deflate stream to '{}'", self.filename);
                    StreamError::EncodeFailed(self.filename.clone())
                })?;

            consumed_total += (self.state.total_in() - before_in) as usize;
            let produced = (self.state.total_out() - before_out) as usize;

            if produced > 0 {
                raw.lock()
                    .write_all(&self.scratch[..produced])
                    .map_err(|err| StreamError::io(&self.filename, err))?;
            }

            if finish {
                if status == Status::StreamEnd {
                    break;
                }
            } else if consumed_total == input.len() {
                break;
            }
        }

        Ok(())
    }

    fn write_raw(&self, raw: &SharedDest, buf: &[u8]) -> Result<()> {
        raw.lock()
            .write_all(buf)
            .map_err(|err| StreamError::io(&self.filename, err))
    }
}
