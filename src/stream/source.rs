//! Raw byte sources for stream readers.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use crate::sync::mutex::Mutex;

/// Backing store variants for a reader.
pub(crate) enum Source {
    Memory {
        buf: Vec<u8>,
        pos: usize,
    },
    File(File),
    Callback(Box<dyn FnMut(&mut [u8]) -> io::Result<usize> + Send>),
}

/// A source plus raw transfer bookkeeping.
///
/// Codec adapters and the reader share one of these through a
/// [`SourceHandle`], so the reader can still rewind the source and query
/// raw byte counts while a decoder owns the read side.
pub(crate) struct RawSource {
    source: Source,
    read: u64,
    eof: bool,
}

impl RawSource {
    pub(crate) fn new(source: Source) -> Self {
        Self {
            source,
            read: 0,
            eof: false,
        }
    }

    /// Pull raw bytes from the source. A zero return sets the EOF flag.
    pub(crate) fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let len = match &mut self.source {
            Source::Memory { buf: mem, pos } => {
                let len = buf.len().min(mem.len() - *pos);
                buf[..len].copy_from_slice(&mem[*pos..*pos + len]);
                *pos += len;
                len
            }
            Source::File(file) => file.read(buf)?,
            Source::Callback(read) => read(buf)?,
        };

        self.read += len as u64;
        if len == 0 {
            self.eof = true;
        }

        Ok(len)
    }

    /// Total source length, when cheaply knowable.
    ///
    /// Pseudo-files (such as `/proc` entries) report 0; callers treat 0
    /// the same as unknown and take the growing-read path.
    pub(crate) fn raw_len(&self) -> Option<u64> {
        match &self.source {
            Source::Memory { buf, .. } => Some(buf.len() as u64),
            Source::File(file) => file.metadata().ok().map(|meta| meta.len()),
            Source::Callback(_) => None,
        }
    }

    /// Seek back to the start. Fails for callback sources.
    pub(crate) fn rewind(&mut self) -> io::Result<bool> {
        match &mut self.source {
            Source::Memory { pos, .. } => *pos = 0,
            Source::File(file) => {
                file.seek(SeekFrom::Start(0))?;
            }
            Source::Callback(_) => return Ok(false),
        }

        self.read = 0;
        self.eof = false;
        Ok(true)
    }

    pub(crate) fn eof(&self) -> bool {
        self.eof
    }

    pub(crate) fn bytes_read(&self) -> u64 {
        self.read
    }
}

/// Shared handle over a [`RawSource`].
pub(crate) type SharedSource = Arc<Mutex<RawSource>>;

/// `io::Read` adapter handed to codec readers (Brotli, LZ4).
pub(crate) struct SourceHandle(pub(crate) SharedSource);

impl Read for SourceHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.lock().read(buf)
    }
}
