//! Buffered file handles behind the codec I/O boundary.
//!
//! [`ArchiveIoSource`] is the capability set the codec-facing adapter
//! drives: read, seek, skip, write, close. [`BufferedFile`] is the concrete
//! implementer used for every archive session, wrapping a file with a
//! size-adaptive read buffer that amortizes syscall overhead against memory
//! footprint. One source is owned by exactly one adapter at a time; it is
//! created on archive-open and destroyed on archive-close.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Upper bound for the adaptive read buffer (50 MiB).
const MAX_BUFFER_CAPACITY: usize = 50 * 1024 * 1024;

/// Pull-based I/O capability set consumed by the codec adapter.
///
/// Mirrors the open/read/skip/seek/write/close contract of the codec
/// boundary. Errors are terminal for the session: the adapter never
/// retries a failed call.
pub trait ArchiveIoSource: Send {
    /// Reads up to `buf.len()` bytes, bounded by the source's buffer
    /// capacity and the bytes remaining in the file. Returns the number
    /// of bytes produced; 0 means end of data.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Repositions the cursor. Returns the resulting absolute position.
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;

    /// Advances the cursor by `delta` bytes via a relative seek.
    ///
    /// Returns the amount actually skipped; 0 signals failure. Never
    /// returns a partial count.
    fn skip(&mut self, delta: u64) -> u64;

    /// Appends bytes to the output stream. Returns bytes accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Flushes and closes the underlying handle. Idempotent.
    fn close(&mut self) -> Result<()>;
}

/// Direction a [`BufferedFile`] was opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Read,
    Write,
}

/// Computes the session read-buffer capacity for a file of `size` bytes.
///
/// `min(max(size / 10, 1), 50 MiB)`, fixed for the whole session.
fn buffer_capacity(size: u64) -> usize {
    let tenth = (size / 10).max(1);
    (tenth.min(MAX_BUFFER_CAPACITY as u64)) as usize
}

/// A file handle with a size-adaptive read buffer.
///
/// Owns the open/close lifecycle of one archive file and exposes the
/// seek/read/write/skip primitives the adapter binds to the codec
/// boundary. The read cursor reported by [`seek`](ArchiveIoSource::seek)
/// is logical: buffered bytes not yet consumed do not affect it.
pub struct BufferedFile {
    path: PathBuf,
    file: Option<File>,
    mode: Mode,
    /// Logical read cursor (position of the next byte `read` returns).
    position: u64,
    file_size: u64,
    buffer: Vec<u8>,
    /// Consumed prefix of the buffered window.
    buf_pos: usize,
    /// Valid bytes in `buffer`.
    buf_len: usize,
}

impl BufferedFile {
    /// Opens a file for reading, positioned at the start.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_at(path, 0)
    }

    /// Opens a file for reading, seeked to `start_offset`.
    ///
    /// Used to begin reading at a known local-header offset without
    /// scanning from the file start.
    pub fn open_at(path: impl AsRef<Path>, start_offset: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let file_size = file.metadata()?.len();
        if start_offset > 0 {
            file.seek(SeekFrom::Start(start_offset))?;
        }
        let capacity = buffer_capacity(file_size);
        Ok(Self {
            path,
            file: Some(file),
            mode: Mode::Read,
            position: start_offset,
            file_size,
            buffer: vec![0; capacity],
            buf_pos: 0,
            buf_len: 0,
        })
    }

    /// Creates (truncating) a file for writing.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        Ok(Self {
            path,
            file: Some(file),
            mode: Mode::Write,
            position: 0,
            file_size: 0,
            buffer: Vec::new(),
            buf_pos: 0,
            buf_len: 0,
        })
    }

    /// Wraps an already-open file opened for writing.
    ///
    /// Used by surgery, where the destination is a named temporary file
    /// whose lifetime is managed by the caller.
    pub fn from_write_handle(path: impl AsRef<Path>, file: File) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: Some(file),
            mode: Mode::Write,
            position: 0,
            file_size: 0,
            buffer: Vec::new(),
            buf_pos: 0,
            buf_len: 0,
        }
    }

    /// Returns the path this handle was opened on.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total size of the underlying file (read sessions).
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Extent of the output written so far (write sessions). Backward
    /// seeks followed by header patches do not inflate this.
    pub fn bytes_written(&self) -> u64 {
        match self.mode {
            Mode::Write => self.file_size,
            Mode::Read => 0,
        }
    }

    /// The fixed per-session buffer capacity.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    fn file_mut(&mut self) -> Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| Error::Io(io::Error::new(io::ErrorKind::NotConnected, "handle closed")))
    }

    fn discard_buffer(&mut self) {
        self.buf_pos = 0;
        self.buf_len = 0;
    }

    /// Refills the buffer window with up to `min(remaining, capacity)` bytes.
    fn fill_buffer(&mut self) -> Result<usize> {
        let remaining = self.file_size.saturating_sub(self.position);
        if remaining == 0 {
            return Ok(0);
        }
        let want = (remaining as usize).min(self.buffer.len());
        let mut filled = 0;
        // A single read may return short; loop until the window is full
        // or the file ends.
        while filled < want {
            let read_buf = &mut self.buffer[filled..want];
            let file = self
                .file
                .as_mut()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "handle closed"))
                .map_err(Error::Io)?;
            let n = file.read(read_buf)?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        self.buf_pos = 0;
        self.buf_len = filled;
        Ok(filled)
    }
}

impl ArchiveIoSource for BufferedFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.mode != Mode::Read {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::Unsupported,
                "read on write-mode handle",
            )));
        }
        if self.buf_pos >= self.buf_len {
            if self.fill_buffer()? == 0 {
                return Ok(0);
            }
        }
        let available = self.buf_len - self.buf_pos;
        let n = available.min(buf.len());
        buf[..n].copy_from_slice(&self.buffer[self.buf_pos..self.buf_pos + n]);
        self.buf_pos += n;
        self.position += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.position as i128 + delta as i128,
            SeekFrom::End(delta) => self.file_size as i128 + delta as i128,
        };
        if target < 0 || target > u64::MAX as i128 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of file",
            )));
        }
        let target = target as u64;
        // The physical cursor is ahead of the logical one by the unread
        // window, so resolve against an absolute position.
        self.discard_buffer();
        self.file_mut()?.seek(SeekFrom::Start(target))?;
        self.position = target;
        Ok(target)
    }

    fn skip(&mut self, delta: u64) -> u64 {
        if delta > i64::MAX as u64 {
            return 0;
        }
        match self.seek(SeekFrom::Current(delta as i64)) {
            Ok(_) => delta,
            Err(_) => 0,
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        if self.mode != Mode::Write {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::Unsupported,
                "write on read-mode handle",
            )));
        }
        let n = self.file_mut()?.write(data)?;
        self.position += n as u64;
        // Writers may seek backwards to patch headers; track the extent
        // so SeekFrom::End stays meaningful.
        self.file_size = self.file_size.max(self.position);
        Ok(n)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            if self.mode == Mode::Write {
                file.flush()?;
            }
        }
        Ok(())
    }
}

impl Drop for BufferedFile {
    fn drop(&mut self) {
        // Deterministic close on all paths; errors here have nowhere to go.
        let _ = self.close();
    }
}
