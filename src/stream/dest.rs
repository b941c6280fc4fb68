//! Raw byte destinations for stream writers.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;

use crate::sync::mutex::Mutex;

/// How a file destination is created.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteFlags {
    /// Write to a temp file and rename it over the destination on
    /// successful close; on error the destination is left untouched.
    pub atomic: bool,
    /// Fail if the destination already exists.
    pub exclusive: bool,
}

impl WriteFlags {
    /// Atomic commit, overwrite allowed.
    pub fn atomic() -> Self {
        Self {
            atomic: true,
            exclusive: false,
        }
    }

    /// Atomic commit, destination must not exist.
    pub fn exclusive() -> Self {
        Self {
            atomic: true,
            exclusive: true,
        }
    }
}

/// Backing store variants for a writer.
pub(crate) enum Destination {
    Memory(Vec<u8>),
    File(File),
    AtomicFile {
        tmp: Option<NamedTempFile>,
        path: PathBuf,
        exclusive: bool,
    },
    Callback(Box<dyn FnMut(&[u8]) -> io::Result<()> + Send>),
}

/// A destination plus raw transfer bookkeeping.
///
/// The failure flag is sticky: once a raw write fails, the destination
/// refuses further writes and an atomic file will never be committed.
pub(crate) struct RawDest {
    dest: Destination,
    written: u64,
    failed: bool,
}

impl RawDest {
    pub(crate) fn new(dest: Destination) -> Self {
        Self {
            dest,
            written: 0,
            failed: false,
        }
    }

    /// Open a file destination according to `flags`.
    pub(crate) fn create_file(path: &Path, flags: WriteFlags) -> io::Result<Self> {
        if flags.atomic {
            if flags.exclusive && path.exists() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "destination already exists",
                ));
            }

            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            let tmp = tempfile::Builder::new()
                .prefix("")
                .rand_bytes(24)
                .suffix(".tmp")
                .tempfile_in(dir)?;

            Ok(Self::new(Destination::AtomicFile {
                tmp: Some(tmp),
                path: path.to_owned(),
                exclusive: flags.exclusive,
            }))
        } else {
            let file = if flags.exclusive {
                OpenOptions::new().write(true).create_new(true).open(path)?
            } else {
                File::create(path)?
            };

            Ok(Self::new(Destination::File(file)))
        }
    }

    /// Push raw bytes to the destination.
    pub(crate) fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        if self.failed {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "destination is in error state",
            ));
        }
        if buf.is_empty() {
            return Ok(());
        }

        let result = match &mut self.dest {
            Destination::Memory(mem) => {
                mem.extend_from_slice(buf);
                Ok(())
            }
            Destination::File(file) => file.write_all(buf),
            Destination::AtomicFile { tmp: Some(tmp), .. } => tmp.write_all(buf),
            Destination::AtomicFile { tmp: None, .. } => Err(io::Error::new(
                io::ErrorKind::Other,
                "destination already committed",
            )),
            Destination::Callback(write) => write(buf),
        };

        match result {
            Ok(()) => {
                self.written += buf.len() as u64;
                Ok(())
            }
            Err(err) => {
                self.failed = true;
                Err(err)
            }
        }
    }

    pub(crate) fn flush(&mut self) -> io::Result<()> {
        match &mut self.dest {
            Destination::File(file) => file.flush(),
            Destination::AtomicFile { tmp: Some(tmp), .. } => tmp.flush(),
            _ => Ok(()),
        }
    }

    /// Commit an atomic destination: rename the temp file into place.
    ///
    /// No-op for other destinations (beyond a flush). Must not be called
    /// after a failed write; `abort` handles that path.
    pub(crate) fn commit(&mut self) -> io::Result<()> {
        debug_assert!(!self.failed);

        self.flush()?;

        if let Destination::AtomicFile {
            tmp,
            path,
            exclusive,
        } = &mut self.dest
        {
            if let Some(tmp) = tmp.take() {
                let result = if *exclusive {
                    tmp.persist_noclobber(&path).map_err(|err| err.error)
                } else {
                    tmp.persist(&path).map_err(|err| err.error)
                };
                // On persist failure the temp file is dropped and deleted
                result?;
            }
        }

        Ok(())
    }

    /// Drop the temp file without touching the destination.
    pub(crate) fn abort(&mut self) {
        if let Destination::AtomicFile { tmp, .. } = &mut self.dest {
            // NamedTempFile deletes itself on drop
            tmp.take();
        }
    }

    /// Take the accumulated buffer of a memory destination.
    pub(crate) fn take_memory(&mut self) -> Option<Vec<u8>> {
        match &mut self.dest {
            Destination::Memory(mem) => Some(std::mem::take(mem)),
            _ => None,
        }
    }

    pub(crate) fn failed(&self) -> bool {
        self.failed
    }

    pub(crate) fn bytes_written(&self) -> u64 {
        self.written
    }
}

/// Shared handle over a [`RawDest`].
pub(crate) type SharedDest = Arc<Mutex<RawDest>>;

/// `io::Write` adapter handed to codec writers (Brotli, LZ4).
pub(crate) struct DestHandle(pub(crate) SharedDest);

impl Write for DestHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().flush()
    }
}
