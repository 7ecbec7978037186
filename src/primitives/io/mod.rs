#![forbid(unsafe_code)]

use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::Path;

use crate::types::Result;

/// Positioned reads and writes against a single backing file.
///
/// `FilePager` addresses pages as `page_id * page_size` offsets through this
/// trait, so tests can swap in a failing or recording implementation.
pub trait FileIo: Send + Sync + 'static {
    /// Fills `dst` from `offset`. Reading past the end is an `UnexpectedEof` I/O error.
    fn read_at(&self, offset: u64, dst: &mut [u8]) -> Result<()>;
    /// Writes all of `src` at `offset`, extending the file if needed.
    fn write_at(&self, offset: u64, src: &[u8]) -> Result<()>;
    /// Flushes data and metadata to durable storage.
    fn sync(&self) -> Result<()>;
    /// Current file length in bytes.
    fn len(&self) -> Result<u64>;
    /// Returns `true` if the file holds no bytes.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
    /// Shrinks or zero-extends the file to `len` bytes.
    fn set_len(&self, len: u64) -> Result<()>;
}

/// [`FileIo`] over a `std::fs::File`.
pub struct StdFileIo {
    file: File,
}

impl StdFileIo {
    /// Wraps an already opened read-write handle.
    pub fn new(file: File) -> Self {
        Self { file }
    }

    /// Opens `path` read-write, creating it empty if missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self::new(file))
    }
}

/// Repeats a positioned call until `len` bytes are transferred.
fn transfer_all(
    len: usize,
    mut offset: u64,
    zero_kind: ErrorKind,
    mut step: impl FnMut(usize, u64) -> io::Result<usize>,
) -> io::Result<()> {
    let mut done = 0;
    while done < len {
        match step(done, offset) {
            Ok(0) => return Err(io::Error::new(zero_kind, "positioned transfer stalled")),
            Ok(n) => {
                done += n;
                offset += n as u64;
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

#[cfg(unix)]
fn pread(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::read_at(file, buf, offset)
}

#[cfg(unix)]
fn pwrite(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::write_at(file, buf, offset)
}

#[cfg(windows)]
fn pread(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_read(file, buf, offset)
}

#[cfg(windows)]
fn pwrite(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_write(file, buf, offset)
}

#[cfg(not(any(unix, windows)))]
fn pread(_file: &File, _buf: &mut [u8], _offset: u64) -> io::Result<usize> {
    Err(io::Error::new(ErrorKind::Unsupported, "positioned reads unsupported"))
}

#[cfg(not(any(unix, windows)))]
fn pwrite(_file: &File, _buf: &[u8], _offset: u64) -> io::Result<usize> {
    Err(io::Error::new(ErrorKind::Unsupported, "positioned writes unsupported"))
}

impl FileIo for StdFileIo {
    fn read_at(&self, offset: u64, dst: &mut [u8]) -> Result<()> {
        let len = dst.len();
        transfer_all(len, offset, ErrorKind::UnexpectedEof, |done, at| {
            pread(&self.file, &mut dst[done..], at)
        })?;
        Ok(())
    }

    fn write_at(&self, offset: u64, src: &[u8]) -> Result<()> {
        transfer_all(src.len(), offset, ErrorKind::WriteZero, |done, at| {
            pwrite(&self.file, &src[done..], at)
        })?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn set_len(&self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        Ok(())
    }
}
