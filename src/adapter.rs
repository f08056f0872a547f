//! Codec-facing I/O adapter.
//!
//! Binds a boxed [`ArchiveIoSource`] to the pull-based contract the codec
//! backends consume: [`std::io::Read`] + [`std::io::Seek`] for read
//! sessions, [`std::io::Write`] + [`std::io::Seek`] for write sessions.
//! The erased box replaces the raw opaque context pointer of a C callback
//! protocol.
//!
//! Error semantics: any transport failure latches the adapter as fatal and
//! all further calls are refused. The adapter never retries silently; a
//! retry after a failed seek or read could hand the codec inconsistent
//! byte ranges.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::source::{ArchiveIoSource, BufferedFile};
use crate::{Error, Result};

fn to_io_error(e: Error) -> io::Error {
    match e {
        Error::Io(io) => io,
        other => io::Error::other(other),
    }
}

fn fatal_error() -> io::Error {
    io::Error::new(
        io::ErrorKind::BrokenPipe,
        "adapter in fatal state after earlier transport failure",
    )
}

/// Read-direction adapter over an archive I/O source.
pub struct SourceReader {
    source: Box<dyn ArchiveIoSource>,
    fatal: bool,
}

impl SourceReader {
    /// Wraps an already-open source.
    pub fn new(source: Box<dyn ArchiveIoSource>) -> Self {
        Self {
            source,
            fatal: false,
        }
    }

    /// Opens `path` for reading from the start of the file.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Box::new(BufferedFile::open(path)?)))
    }

    /// Opens `path` for reading, positioned at `start_offset`.
    ///
    /// This is how indexer-supplied local-header offsets become read
    /// sessions without scanning from the file start.
    pub fn open_path_at(path: impl AsRef<Path>, start_offset: u64) -> Result<Self> {
        Ok(Self::new(Box::new(BufferedFile::open_at(
            path,
            start_offset,
        )?)))
    }

    /// Advances past `delta` bytes. Returns the amount skipped, 0 on
    /// failure (which also latches the fatal flag).
    pub fn skip(&mut self, delta: u64) -> u64 {
        if self.fatal {
            return 0;
        }
        let skipped = self.source.skip(delta);
        if skipped == 0 && delta != 0 {
            self.fatal = true;
        }
        skipped
    }

    /// Closes the underlying source.
    pub fn close(mut self) -> Result<()> {
        self.source.close()
    }
}

impl Read for SourceReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.fatal {
            return Err(fatal_error());
        }
        self.source.read(buf).map_err(|e| {
            self.fatal = true;
            to_io_error(e)
        })
    }
}

impl Seek for SourceReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if self.fatal {
            return Err(fatal_error());
        }
        self.source.seek(pos).map_err(|e| {
            self.fatal = true;
            to_io_error(e)
        })
    }
}

/// Write-direction adapter over an archive I/O source.
///
/// Tracks the high-water extent of the output: container writers seek
/// back to patch headers, and those rewrites must not inflate the
/// reported size. The adapter owns the handle it wraps and releases it
/// in [`finish`](SourceWriter::finish) (or on drop).
pub struct SourceWriter {
    source: Box<dyn ArchiveIoSource>,
    /// Current write position.
    position: u64,
    /// Largest position ever written to, i.e. the output file size.
    extent: u64,
    fatal: bool,
}

impl SourceWriter {
    /// Wraps an already-open source.
    pub fn new(source: Box<dyn ArchiveIoSource>) -> Self {
        Self {
            source,
            position: 0,
            extent: 0,
            fatal: false,
        }
    }

    /// Creates `path` (truncating) and opens it for writing.
    pub fn create_path(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Box::new(BufferedFile::create(path)?)))
    }

    /// Wraps an already-open write handle, e.g. a named temporary file.
    pub fn from_file(path: impl AsRef<Path>, file: std::fs::File) -> Self {
        Self::new(Box::new(BufferedFile::from_write_handle(path, file)))
    }

    /// Size of the output written so far.
    pub fn bytes_written(&self) -> u64 {
        self.extent
    }

    /// Flushes, closes, and returns the size of the output.
    pub fn finish(mut self) -> Result<u64> {
        self.source.close()?;
        Ok(self.extent)
    }
}

impl Write for SourceWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.fatal {
            return Err(fatal_error());
        }
        match self.source.write(data) {
            Ok(n) => {
                self.position += n as u64;
                self.extent = self.extent.max(self.position);
                Ok(n)
            }
            Err(e) => {
                self.fatal = true;
                Err(to_io_error(e))
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for SourceWriter {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if self.fatal {
            return Err(fatal_error());
        }
        match self.source.seek(pos) {
            Ok(resolved) => {
                self.position = resolved;
                Ok(resolved)
            }
            Err(e) => {
                self.fatal = true;
                Err(to_io_error(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Source whose reads always fail, for fatal-latch checks.
    struct FailingSource;

    impl ArchiveIoSource for FailingSource {
        fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
            Err(Error::Io(io::Error::other("boom")))
        }
        fn seek(&mut self, _pos: SeekFrom) -> Result<u64> {
            Err(Error::Io(io::Error::other("boom")))
        }
        fn skip(&mut self, _delta: u64) -> u64 {
            0
        }
        fn write(&mut self, _data: &[u8]) -> Result<usize> {
            Err(Error::Io(io::Error::other("boom")))
        }
        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_reader_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"abcdefgh").unwrap();

        let mut reader = SourceReader::open_path(&path).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abcdefgh");
    }

    #[test]
    fn test_reader_latches_fatal() {
        let mut reader = SourceReader::new(Box::new(FailingSource));
        let mut buf = [0u8; 4];
        assert!(reader.read(&mut buf).is_err());
        // Every call after a transport failure is refused without
        // touching the source again.
        let err = reader.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(reader.skip(1), 0);
    }

    #[test]
    fn test_writer_counts_and_finishes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bin");
        let mut writer = SourceWriter::create_path(&path).unwrap();
        writer.write_all(b"hello").unwrap();
        assert_eq!(writer.bytes_written(), 5);
        let total = writer.finish().unwrap();
        assert_eq!(total, 5);
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn test_writer_reports_extent_not_write_volume() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bin");
        let mut writer = SourceWriter::create_path(&path).unwrap();
        writer.write_all(b"0123456789").unwrap();
        writer.seek(SeekFrom::Start(0)).unwrap();
        writer.write_all(b"abcd").unwrap();
        // 14 bytes accepted, but the output file is 10 bytes.
        assert_eq!(writer.bytes_written(), 10);
        assert_eq!(writer.finish().unwrap(), 10);
        assert_eq!(std::fs::read(&path).unwrap().len(), 10);
    }

    #[test]
    fn test_writer_latches_fatal() {
        let mut writer = SourceWriter::new(Box::new(FailingSource));
        assert!(writer.write(b"x").is_err());
        let err = writer.write(b"y").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
