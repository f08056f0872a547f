//! Tar driver, plain and compressed.
//!
//! Both directions run over the `tar` crate's `Header` for field encoding
//! while the session logic streams 512-byte blocks itself, which is what
//! lets payloads flow through the pull-based block protocol instead of
//! being staged in memory. Compression is layered outside the container:
//! gzip via `flate2`, bzip2 and xz via the optional `bzip2` and `xz2`
//! backends.

use std::io::{Read, Write};

use super::{Driver, EntryHeader, EntryKind, ReadSession, WriteSession};
use crate::adapter::{SourceReader, SourceWriter};
use crate::{Error, Result};

const BLOCK_SIZE: usize = 512;

/// Name GNU tar stores in long-name pseudo-entry headers.
const GNU_LONGNAME: &str = "././@LongLink";

/// Compression layered around the tar stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TarCompression {
    /// Plain `.tar`.
    None,
    /// `.tar.gz` / `.tgz`.
    Gzip,
    /// `.tar.bz2` / `.tbz2`.
    #[cfg(feature = "bzip2")]
    Bzip2,
    /// `.tar.xz` / `.txz`.
    #[cfg(feature = "xz")]
    Xz,
}

/// Driver for tar containers with optional stream compression.
pub struct TarDriver {
    compression: TarCompression,
}

impl TarDriver {
    /// Creates a driver for the given compression layer.
    pub fn new(compression: TarCompression) -> Self {
        Self { compression }
    }
}

impl Driver for TarDriver {
    fn open_read(&self, source: SourceReader) -> Result<Box<dyn ReadSession>> {
        let reader: Box<dyn Read + Send> = match self.compression {
            TarCompression::None => Box::new(source),
            TarCompression::Gzip => Box::new(flate2::read::GzDecoder::new(source)),
            #[cfg(feature = "bzip2")]
            TarCompression::Bzip2 => Box::new(bzip2::read::BzDecoder::new(source)),
            #[cfg(feature = "xz")]
            TarCompression::Xz => Box::new(xz2::read::XzDecoder::new(source)),
        };
        Ok(Box::new(TarReadSession::new(reader)))
    }

    fn open_write(&self, sink: SourceWriter) -> Result<Box<dyn WriteSession>> {
        let sink = match self.compression {
            TarCompression::None => TarSink::Plain(sink),
            TarCompression::Gzip => TarSink::Gzip(flate2::write::GzEncoder::new(
                sink,
                flate2::Compression::default(),
            )),
            #[cfg(feature = "bzip2")]
            TarCompression::Bzip2 => TarSink::Bzip2(bzip2::write::BzEncoder::new(
                sink,
                bzip2::Compression::default(),
            )),
            #[cfg(feature = "xz")]
            TarCompression::Xz => TarSink::Xz(xz2::write::XzEncoder::new(sink, 6)),
        };
        Ok(Box::new(TarWriteSession::new(sink)))
    }
}

/// Sequential tar reader over a (possibly decompressed) byte stream.
///
/// Offsets are reported within the decoded stream, so they are only
/// seekable positions for plain `.tar`.
struct TarReadSession {
    reader: Box<dyn Read + Send>,
    /// Decoded-stream position of the next unread byte.
    pos: u64,
    /// Unread payload bytes of the current entry.
    remaining: u64,
    /// Zero padding after the current payload.
    padding: u64,
    done: bool,
}

impl TarReadSession {
    fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader,
            pos: 0,
            remaining: 0,
            padding: 0,
            done: false,
        }
    }

    /// Reads one header block; `None` on clean end of stream.
    fn read_header_block(&mut self) -> Result<Option<[u8; BLOCK_SIZE]>> {
        let mut block = [0u8; BLOCK_SIZE];
        let mut filled = 0;
        while filled < BLOCK_SIZE {
            let n = self.reader.read(&mut block[filled..])?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(Error::Parse {
                    offset: self.pos + filled as u64,
                    reason: "tar header truncated mid-block".into(),
                });
            }
            filled += n;
        }
        self.pos += BLOCK_SIZE as u64;
        Ok(Some(block))
    }

    fn discard(&mut self, mut count: u64) -> Result<()> {
        let mut sink = [0u8; 4096];
        while count > 0 {
            let want = count.min(sink.len() as u64) as usize;
            let n = self.reader.read(&mut sink[..want])?;
            if n == 0 {
                return Err(Error::Parse {
                    offset: self.pos,
                    reason: "tar payload truncated before declared size".into(),
                });
            }
            self.pos += n as u64;
            count -= n as u64;
        }
        Ok(())
    }

    /// Reads a NUL-terminated string payload (GNU long name/link).
    fn read_string_payload(&mut self, size: u64) -> Result<String> {
        let padded = size.div_ceil(BLOCK_SIZE as u64) * BLOCK_SIZE as u64;
        let mut buf = vec![0u8; padded as usize];
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.reader.read(&mut buf[filled..])?;
            if n == 0 {
                return Err(Error::Parse {
                    offset: self.pos,
                    reason: "GNU long-name payload truncated".into(),
                });
            }
            filled += n;
        }
        self.pos += padded;
        buf.truncate(size as usize);
        while buf.last() == Some(&0) {
            buf.pop();
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

fn padding_for(size: u64) -> u64 {
    (BLOCK_SIZE as u64 - size % BLOCK_SIZE as u64) % BLOCK_SIZE as u64
}

impl ReadSession for TarReadSession {
    fn next_entry(&mut self) -> Result<Option<EntryHeader>> {
        if self.done {
            return Ok(None);
        }
        self.discard(self.remaining + self.padding)?;
        self.remaining = 0;
        self.padding = 0;

        let mut long_name: Option<String> = None;
        let mut long_link: Option<String> = None;
        loop {
            let header_offset = self.pos;
            let Some(block) = self.read_header_block()? else {
                self.done = true;
                return Ok(None);
            };
            if block.iter().all(|&b| b == 0) {
                self.done = true;
                return Ok(None);
            }

            let mut header = tar::Header::new_old();
            header.as_mut_bytes().copy_from_slice(&block);
            let etype = header.entry_type();
            let size = header.size().map_err(|e| Error::Parse {
                offset: header_offset,
                reason: format!("bad tar size field: {}", e),
            })?;

            if etype.is_gnu_longname() {
                long_name = Some(self.read_string_payload(size)?);
                continue;
            }
            if etype.is_gnu_longlink() {
                long_link = Some(self.read_string_payload(size)?);
                continue;
            }
            if etype.is_pax_local_extensions() || etype.is_pax_global_extensions() {
                // Extended attributes are not surfaced; skip the record.
                self.discard(size + padding_for(size))?;
                continue;
            }

            let path = match long_name.take() {
                Some(name) => name,
                None => header
                    .path()
                    .map(|p| p.to_string_lossy().into_owned())
                    .map_err(|e| Error::Parse {
                        offset: header_offset,
                        reason: format!("bad tar path field: {}", e),
                    })?,
            };

            let kind = if etype.is_symlink() {
                let target = match long_link.take() {
                    Some(t) => t,
                    None => header
                        .link_name()
                        .ok()
                        .flatten()
                        .map(|p| p.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                };
                EntryKind::Symlink { target }
            } else if etype.is_dir() {
                EntryKind::Directory
            } else if etype.is_file() {
                EntryKind::File
            } else {
                EntryKind::Other
            };

            let payload = if matches!(kind, EntryKind::File | EntryKind::Other) {
                size
            } else {
                0
            };
            self.remaining = payload;
            self.padding = padding_for(payload);

            return Ok(Some(EntryHeader {
                path,
                size: payload,
                compressed_size: payload,
                header_offset,
                kind,
                mode: header.mode().ok(),
                mtime: header.mtime().ok().map(|m| m as i64),
            }));
        }
    }

    fn read_block(&mut self, buf: &mut [u8]) -> Result<usize> {
        let want = self.remaining.min(buf.len() as u64) as usize;
        if want == 0 {
            return Ok(0);
        }
        let n = self.reader.read(&mut buf[..want])?;
        if n == 0 {
            return Err(Error::Parse {
                offset: self.pos,
                reason: "tar payload truncated before declared size".into(),
            });
        }
        self.pos += n as u64;
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// Write-direction compression stack.
enum TarSink {
    Plain(SourceWriter),
    Gzip(flate2::write::GzEncoder<SourceWriter>),
    #[cfg(feature = "bzip2")]
    Bzip2(bzip2::write::BzEncoder<SourceWriter>),
    #[cfg(feature = "xz")]
    Xz(xz2::write::XzEncoder<SourceWriter>),
}

impl TarSink {
    fn finish(self) -> Result<SourceWriter> {
        match self {
            TarSink::Plain(w) => Ok(w),
            TarSink::Gzip(e) => Ok(e.finish()?),
            #[cfg(feature = "bzip2")]
            TarSink::Bzip2(e) => Ok(e.finish()?),
            #[cfg(feature = "xz")]
            TarSink::Xz(e) => Ok(e.finish()?),
        }
    }
}

impl Write for TarSink {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        match self {
            TarSink::Plain(w) => w.write(data),
            TarSink::Gzip(e) => e.write(data),
            #[cfg(feature = "bzip2")]
            TarSink::Bzip2(e) => e.write(data),
            #[cfg(feature = "xz")]
            TarSink::Xz(e) => e.write(data),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            TarSink::Plain(w) => w.flush(),
            TarSink::Gzip(e) => e.flush(),
            #[cfg(feature = "bzip2")]
            TarSink::Bzip2(e) => e.flush(),
            #[cfg(feature = "xz")]
            TarSink::Xz(e) => e.flush(),
        }
    }
}

/// Hand-driven tar writer emitting GNU-style headers.
struct TarWriteSession {
    sink: Option<TarSink>,
    /// Declared payload bytes still expected for the current entry.
    remaining: u64,
    /// Zero padding owed once the payload completes.
    padding: u64,
}

impl TarWriteSession {
    fn new(sink: TarSink) -> Self {
        Self {
            sink: Some(sink),
            remaining: 0,
            padding: 0,
        }
    }

    fn sink_mut(&mut self) -> Result<&mut TarSink> {
        self.sink.as_mut().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "tar write session already finished",
            ))
        })
    }

    /// Closes out the previous entry: the payload must be complete, and
    /// the block padding is written here.
    fn close_entry(&mut self) -> Result<()> {
        if self.remaining > 0 {
            return Err(Error::Codec(format!(
                "entry payload short by {} bytes",
                self.remaining
            )));
        }
        if self.padding > 0 {
            let pad = vec![0u8; self.padding as usize];
            self.sink_mut()?.write_all(&pad)?;
            self.padding = 0;
        }
        Ok(())
    }

    /// Emits a GNU long-name or long-link pseudo-entry carrying `value`.
    fn write_gnu_long(&mut self, etype: tar::EntryType, value: &str) -> Result<()> {
        let payload_len = value.len() as u64 + 1;
        let mut header = tar::Header::new_gnu();
        {
            let bytes = header.as_mut_bytes();
            let name = GNU_LONGNAME.as_bytes();
            bytes[..name.len()].copy_from_slice(name);
        }
        header.set_entry_type(etype);
        header.set_size(payload_len);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_cksum();

        let sink = self.sink_mut()?;
        sink.write_all(header.as_bytes())?;
        sink.write_all(value.as_bytes())?;
        sink.write_all(&[0u8])?;
        let pad = padding_for(payload_len);
        if pad > 0 {
            sink.write_all(&vec![0u8; pad as usize])?;
        }
        Ok(())
    }

    /// Sets the header name, spilling to a GNU long-name entry when the
    /// path does not fit the 100-byte field.
    fn set_path_or_spill(&mut self, header: &mut tar::Header, path: &str) -> Result<()> {
        if header.set_path(path).is_ok() {
            return Ok(());
        }
        self.write_gnu_long(tar::EntryType::GNULongName, path)?;
        let bytes = header.as_mut_bytes();
        let truncated = &path.as_bytes()[..path.len().min(100)];
        bytes[..truncated.len()].copy_from_slice(truncated);
        Ok(())
    }
}

impl WriteSession for TarWriteSession {
    fn write_entry(&mut self, entry: &EntryHeader) -> Result<()> {
        self.close_entry()?;

        if matches!(entry.kind, EntryKind::Other) {
            return Ok(());
        }

        let mut header = tar::Header::new_gnu();
        match &entry.kind {
            EntryKind::File => {
                header.set_entry_type(tar::EntryType::Regular);
                header.set_size(entry.size);
                self.remaining = entry.size;
                self.padding = padding_for(entry.size);
            }
            EntryKind::Directory => {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_size(0);
            }
            EntryKind::Symlink { target } => {
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_size(0);
                if header.set_link_name(target.as_str()).is_err() {
                    self.write_gnu_long(tar::EntryType::GNULongLink, target)?;
                    let bytes = header.as_mut_bytes();
                    let truncated = &target.as_bytes()[..target.len().min(100)];
                    bytes[157..157 + truncated.len()].copy_from_slice(truncated);
                }
            }
            EntryKind::Other => unreachable!(),
        }

        let default_mode = if matches!(entry.kind, EntryKind::Directory) {
            0o755
        } else {
            0o644
        };
        header.set_mode(entry.mode.unwrap_or(default_mode));
        header.set_mtime(entry.mtime.unwrap_or(0).max(0) as u64);

        let path = if matches!(entry.kind, EntryKind::Directory) && !entry.path.ends_with('/') {
            format!("{}/", entry.path)
        } else {
            entry.path.clone()
        };
        self.set_path_or_spill(&mut header, &path)?;
        header.set_cksum();
        self.sink_mut()?.write_all(header.as_bytes())?;
        Ok(())
    }

    fn write_block(&mut self, data: &[u8]) -> Result<usize> {
        if data.len() as u64 > self.remaining {
            return Err(Error::Codec(
                "payload exceeds the declared entry size".into(),
            ));
        }
        let n = self.sink_mut()?.write(data)?;
        self.remaining -= n as u64;
        Ok(n)
    }

    fn finish(mut self: Box<Self>) -> Result<u64> {
        self.close_entry()?;
        // Two zero blocks terminate the archive.
        self.sink_mut()?.write_all(&[0u8; BLOCK_SIZE * 2])?;
        let sink = self.sink.take().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "tar write session already finished",
            ))
        })?;
        sink.finish()?.finish()
    }
}
