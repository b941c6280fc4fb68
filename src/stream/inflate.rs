//! Deflate decoder for the Gzip and Zlib framings.
//!
//! The Gzip header is parsed by hand (flate2's raw state machine only
//! covers the Deflate body) and the trailing CRC32 + size are validated
//! against the decoded output. Headers longer than 4096 bytes are
//! rejected rather than buffered; see
//! [`StreamError::OversizedHeader`](crate::stream::StreamError).

use flate2::{Crc, Decompress, FlushDecompress, Status};

use crate::stream::error::{Result, StreamError};
use crate::stream::source::SharedSource;
use crate::stream::{GZIP_HEADER_MAX, INPUT_BUFFER_SIZE};

const FHCRC: u8 = 1 << 1;
const FEXTRA: u8 = 1 << 2;
const FNAME: u8 = 1 << 3;
const FCOMMENT: u8 = 1 << 4;
const FRESERVED: u8 = 0xE0;

/// Streaming decoder for Gzip and Zlib sources.
pub(crate) struct InflateDecoder {
    filename: String,
    state: Decompress,
    gzip: bool,

    header_done: bool,
    /// Deflate body fully decoded.
    done: bool,
    /// Trailer validated (or not applicable); nothing left to produce.
    finished: bool,

    crc: Crc,
    in_buf: Vec<u8>,
    in_pos: usize,
}

impl InflateDecoder {
    pub(crate) fn new(gzip: bool, filename: &str) -> Self {
        Self {
            filename: filename.to_owned(),
            // Gzip framing is parsed here, so the body is raw Deflate;
            // Zlib framing (and its Adler32 check) stays in flate2
            state: Decompress::new(!gzip),
            gzip,
            header_done: false,
            done: false,
            finished: false,
            crc: Crc::new(),
            in_buf: Vec::new(),
            in_pos: 0,
        }
    }

    /// Decode up to `out.len()` bytes. Returns the byte count and whether
    /// the stream is fully consumed.
    pub(crate) fn read(&mut self, raw: &SharedSource, out: &mut [u8]) -> Result<(usize, bool)> {
        if self.finished || out.is_empty() {
            return Ok((0, self.finished));
        }

        if self.gzip && !self.header_done {
            self.parse_gzip_header(raw)?;
            self.header_done = true;
        }

        let mut written = 0;
        while written < out.len() {
            if self.done {
                if self.gzip {
                    self.check_gzip_trailer(raw)?;
                }
                self.finished = true;
                break;
            }

            if self.in_pos == self.in_buf.len() {
                self.refill(raw)?;
            }

            let before_in = self.state.total_in();
            let before_out = self.state.total_out();

            let status = self
                .state
                .decompress(
                    &self.in_buf[self.in_pos..],
                    &mut out[written..],
                    FlushDecompress::None,
                )
                .map_err(|_| {
                    log::error!("Malformed compressed data in '{}'", self.filename);
                    StreamError::CorruptData(self.filename.clone())
                })?;

            let consumed = (self.state.total_in() - before_in) as usize;
            let produced = (self.state.total_out() - before_out) as usize;
            self.in_pos += consumed;

            if self.gzip && produced > 0 {
                self.crc.update(&out[written..written + produced]);
            }
            written += produced;

            if status == Status::StreamEnd {
                self.done = true;
            } else if consumed == 0 && produced == 0 {
                // No forward progress with input and output space available
                log::error!("Malformed compressed data in '{}'", self.filename);
                return Err(StreamError::CorruptData(self.filename.clone()));
            }
        }

        Ok((written, self.finished))
    }

    /// Refill the input buffer from the raw source.
    ///
    /// Reaching source EOF while the Deflate body is unfinished means the
    /// stream was truncated.
    fn refill(&mut self, raw: &SharedSource) -> Result<()> {
        self.in_buf.resize(INPUT_BUFFER_SIZE, 0);

        let len = raw
            .lock()
            .read(&mut self.in_buf)
            .map_err(|err| StreamError::io(&self.filename, err))?;
        self.in_buf.truncate(len);
        self.in_pos = 0;

        if len == 0 {
            log::error!("Truncated compressed stream in '{}'", self.filename);
            return Err(StreamError::TruncatedStream(self.filename.clone()));
        }

        Ok(())
    }

    /// Pull exactly `buf.len()` bytes, draining buffered input first.
    fn read_exact(&mut self, raw: &SharedSource, buf: &mut [u8]) -> Result<()> {
        let take = buf.len().min(self.in_buf.len() - self.in_pos);
        buf[..take].copy_from_slice(&self.in_buf[self.in_pos..self.in_pos + take]);
        self.in_pos += take;

        let mut have = take;
        while have < buf.len() {
            let len = raw
                .lock()
                .read(&mut buf[have..])
                .map_err(|err| StreamError::io(&self.filename, err))?;
            if len == 0 {
                log::error!("Truncated compressed stream in '{}'", self.filename);
                return Err(StreamError::TruncatedStream(self.filename.clone()));
            }
            have += len;
        }

        Ok(())
    }

    /// Parse the RFC 1952 header: magic, method, flags, and the optional
    /// FEXTRA / FNAME / FCOMMENT / FHCRC fields. The header CRC16 field is
    /// accepted without verification.
    fn parse_gzip_header(&mut self, raw: &SharedSource) -> Result<()> {
        let mut fixed = [0u8; 10];
        self.read_exact(raw, &mut fixed)?;
        let mut header_len = 10usize;

        if fixed[0] != 0x1F || fixed[1] != 0x8B || fixed[2] != 8 || fixed[3] & FRESERVED != 0 {
            log::error!("File '{}' does not look like a Gzip stream", self.filename);
            return Err(StreamError::MalformedHeader(self.filename.clone()));
        }
        let flags = fixed[3];

        if flags & FEXTRA != 0 {
            let mut len = [0u8; 2];
            self.read_exact(raw, &mut len)?;
            let extra_len = u16::from_le_bytes(len) as usize;

            header_len += 2 + extra_len;
            if header_len > GZIP_HEADER_MAX {
                log::error!("Gzip header in '{}' exceeds the 4096 byte limit", self.filename);
                return Err(StreamError::OversizedHeader(self.filename.clone()));
            }
            self.skip(raw, extra_len)?;
        }
        if flags & FNAME != 0 {
            header_len += self.skip_string(raw, GZIP_HEADER_MAX - header_len)?;
        }
        if flags & FCOMMENT != 0 {
            header_len += self.skip_string(raw, GZIP_HEADER_MAX - header_len)?;
        }
        if flags & FHCRC != 0 {
            let mut crc16 = [0u8; 2];
            self.read_exact(raw, &mut crc16)?;
            header_len += 2;
        }

        if header_len > GZIP_HEADER_MAX {
            log::error!("Gzip header in '{}' exceeds the 4096 byte limit", self.filename);
            return Err(StreamError::OversizedHeader(self.filename.clone()));
        }

        Ok(())
    }

    fn skip(&mut self, raw: &SharedSource, mut len: usize) -> Result<()> {
        let mut scratch = [0u8; 256];
        while len > 0 {
            let take = len.min(scratch.len());
            self.read_exact(raw, &mut scratch[..take])?;
            len -= take;
        }
        Ok(())
    }

    /// Skip a NUL-terminated field, bounded by `max`. Returns the bytes
    /// consumed (terminator included).
    fn skip_string(&mut self, raw: &SharedSource, max: usize) -> Result<usize> {
        let mut byte = [0u8; 1];
        let mut len = 0;

        loop {
            if len >= max {
                log::error!("Gzip header in '{}' exceeds the 4096 byte limit", self.filename);
                return Err(StreamError::OversizedHeader(self.filename.clone()));
            }
            self.read_exact(raw, &mut byte)?;
            len += 1;
            if byte[0] == 0 {
                return Ok(len);
            }
        }
    }

    /// Validate the trailing CRC32 and uncompressed size against what we
    /// actually decoded.
    fn check_gzip_trailer(&mut self, raw: &SharedSource) -> Result<()> {
        let mut trailer = [0u8; 8];
        self.read_exact(raw, &mut trailer)?;

        let crc32 = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let uncompressed = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]);

        if crc32 != self.crc.sum() || uncompressed != self.crc.amount() {
            log::error!("Failed CRC32 check in '{}'", self.filename);
            return Err(StreamError::TrailerMismatch(self.filename.clone()));
        }

        Ok(())
    }
}
