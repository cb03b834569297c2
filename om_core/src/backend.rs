//! Backing store traits the codec consumes, plus file and in-memory
//! implementations.
//!
//! The core never owns I/O policy: memory mapping, caching, and scheduling
//! belong to the backend. `prefetch` is advisory — correctness never
//! depends on it — and backends that already have the bytes resident
//! (slices, small files) report `needs_prefetch() == false` so readers can
//! skip the hinting pass entirely.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::Result;

/// Random-access byte source.
pub trait ReadBackend {
    /// Total length of the underlying byte stream.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read exactly `buf.len()` bytes starting at `offset`.
    fn read_range(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Advise that `[offset, offset + len)` will be read soon. No-op by
    /// default.
    fn prefetch(&self, _offset: u64, _len: u64) {}

    /// Whether issuing [`prefetch`](Self::prefetch) hints is worthwhile.
    fn needs_prefetch(&self) -> bool {
        false
    }
}

/// Append-only byte sink. Byte count and order are preserved exactly.
pub trait WriteBackend {
    fn write(&mut self, bytes: &[u8]) -> Result<()>;
}

/// Seek-and-read file source.
pub struct FileBackend {
    file: File,
    len: u64,
}

impl FileBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }
}

impl ReadBackend for FileBackend {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_range(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }
}

impl WriteBackend for File {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_all(bytes)?;
        Ok(())
    }
}

impl WriteBackend for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

impl ReadBackend for &[u8] {
    fn len(&self) -> u64 {
        <[u8]>::len(self) as u64
    }

    fn read_range(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let start = offset as usize;
        let end = start
            .checked_add(buf.len())
            .filter(|&end| end <= <[u8]>::len(self))
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!(
                        "read of {} bytes at offset {offset} past end ({})",
                        buf.len(),
                        <[u8]>::len(self)
                    ),
                )
            })?;
        buf.copy_from_slice(&self[start..end]);
        Ok(())
    }
}

impl ReadBackend for Vec<u8> {
    fn len(&self) -> u64 {
        <[u8]>::len(self) as u64
    }

    fn read_range(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.as_slice().read_range(offset, buf)
    }
}
