//! Cpio driver for the "new ASCII" (newc) format.
//!
//! No ecosystem backend covers newc the way `zip` and `tar` cover their
//! formats, so both directions are implemented directly: a 110-byte ASCII
//! header of 8-digit hex fields, the NUL-terminated name, and 4-byte
//! alignment for both the name and the payload.

use std::io::{Read, Write};

use super::{Driver, EntryHeader, EntryKind, ReadSession, WriteSession};
use crate::adapter::{SourceReader, SourceWriter};
use crate::{Error, Result};

const MAGIC: &[u8; 6] = b"070701";
const HEADER_SIZE: usize = 110;
const TRAILER: &str = "TRAILER!!!";

const S_IFMT: u32 = 0o170000;
const S_IFREG: u32 = 0o100000;
const S_IFDIR: u32 = 0o040000;
const S_IFLNK: u32 = 0o120000;

/// Driver for `.cpio` archives in newc format.
pub struct CpioDriver;

impl Driver for CpioDriver {
    fn open_read(&self, source: SourceReader) -> Result<Box<dyn ReadSession>> {
        Ok(Box::new(CpioReadSession {
            source,
            pos: 0,
            remaining: 0,
            padding: 0,
            done: false,
        }))
    }

    fn open_write(&self, sink: SourceWriter) -> Result<Box<dyn WriteSession>> {
        Ok(Box::new(CpioWriteSession {
            sink: Some(sink),
            next_ino: 1,
            remaining: 0,
            padding: 0,
        }))
    }
}

fn pad4(len: u64) -> u64 {
    (4 - len % 4) % 4
}

fn parse_hex8(field: &[u8], pos: u64, what: &str) -> Result<u64> {
    let text = std::str::from_utf8(field).map_err(|_| Error::Parse {
        offset: pos,
        reason: format!("cpio {} field is not ASCII", what),
    })?;
    u64::from_str_radix(text, 16).map_err(|_| Error::Parse {
        offset: pos,
        reason: format!("cpio {} field is not hex: '{}'", what, text),
    })
}

struct CpioReadSession {
    source: SourceReader,
    pos: u64,
    remaining: u64,
    padding: u64,
    done: bool,
}

impl CpioReadSession {
    fn read_exact_counted(&mut self, buf: &mut [u8]) -> Result<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.source.read(&mut buf[filled..])?;
            if n == 0 {
                if filled == 0 {
                    return Ok(false);
                }
                return Err(Error::Parse {
                    offset: self.pos + filled as u64,
                    reason: "cpio record truncated".into(),
                });
            }
            filled += n;
        }
        self.pos += buf.len() as u64;
        Ok(true)
    }

    fn discard(&mut self, count: u64) -> Result<()> {
        let mut sink = [0u8; 4096];
        let mut left = count;
        while left > 0 {
            let want = left.min(sink.len() as u64) as usize;
            if !self.read_exact_counted(&mut sink[..want])? {
                return Err(Error::Parse {
                    offset: self.pos,
                    reason: "cpio payload truncated".into(),
                });
            }
            left -= want as u64;
        }
        Ok(())
    }
}

impl ReadSession for CpioReadSession {
    fn next_entry(&mut self) -> Result<Option<EntryHeader>> {
        if self.done {
            return Ok(None);
        }
        self.discard(self.remaining + self.padding)?;
        self.remaining = 0;
        self.padding = 0;

        let header_offset = self.pos;
        let mut header = [0u8; HEADER_SIZE];
        if !self.read_exact_counted(&mut header)? {
            self.done = true;
            return Ok(None);
        }
        if &header[..6] != MAGIC {
            return Err(Error::Parse {
                offset: header_offset,
                reason: "bad cpio magic (only newc is supported)".into(),
            });
        }

        let field = |i: usize| &header[6 + i * 8..6 + (i + 1) * 8];
        let mode = parse_hex8(field(1), header_offset, "mode")? as u32;
        let mtime = parse_hex8(field(5), header_offset, "mtime")? as i64;
        let filesize = parse_hex8(field(6), header_offset, "filesize")?;
        let namesize = parse_hex8(field(11), header_offset, "namesize")?;

        let mut name_buf = vec![0u8; namesize as usize];
        if !self.read_exact_counted(&mut name_buf)? {
            return Err(Error::Parse {
                offset: self.pos,
                reason: "cpio name truncated".into(),
            });
        }
        self.discard(pad4(HEADER_SIZE as u64 + namesize))?;
        while name_buf.last() == Some(&0) {
            name_buf.pop();
        }
        let path = String::from_utf8_lossy(&name_buf).into_owned();

        if path == TRAILER {
            self.done = true;
            return Ok(None);
        }

        let kind = match mode & S_IFMT {
            S_IFDIR => EntryKind::Directory,
            S_IFLNK => {
                let mut target = vec![0u8; filesize as usize];
                if !self.read_exact_counted(&mut target)? {
                    return Err(Error::Parse {
                        offset: self.pos,
                        reason: "cpio symlink target truncated".into(),
                    });
                }
                self.discard(pad4(filesize))?;
                EntryKind::Symlink {
                    target: String::from_utf8_lossy(&target).into_owned(),
                }
            }
            S_IFREG => EntryKind::File,
            _ => EntryKind::Other,
        };

        let payload = match kind {
            EntryKind::File | EntryKind::Other => filesize,
            _ => 0,
        };
        self.remaining = payload;
        self.padding = pad4(payload);

        Ok(Some(EntryHeader {
            path,
            size: payload,
            compressed_size: payload,
            header_offset,
            kind,
            mode: Some(mode & 0o7777),
            mtime: Some(mtime),
        }))
    }

    fn read_block(&mut self, buf: &mut [u8]) -> Result<usize> {
        let want = self.remaining.min(buf.len() as u64) as usize;
        if want == 0 {
            return Ok(0);
        }
        let n = self.source.read(&mut buf[..want])?;
        if n == 0 {
            return Err(Error::Parse {
                offset: self.pos,
                reason: "cpio payload truncated".into(),
            });
        }
        self.pos += n as u64;
        self.remaining -= n as u64;
        Ok(n)
    }
}

struct CpioWriteSession {
    sink: Option<SourceWriter>,
    next_ino: u64,
    remaining: u64,
    padding: u64,
}

impl CpioWriteSession {
    fn sink_mut(&mut self) -> Result<&mut SourceWriter> {
        self.sink.as_mut().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "cpio write session already finished",
            ))
        })
    }

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

    fn write_header(
        &mut self,
        name: &str,
        mode: u32,
        nlink: u64,
        mtime: i64,
        filesize: u64,
    ) -> Result<()> {
        let ino = self.next_ino;
        self.next_ino += 1;
        let namesize = name.len() as u64 + 1;

        let mut header = String::with_capacity(HEADER_SIZE);
        header.push_str("070701");
        for value in [
            ino,
            mode as u64,
            0, // uid
            0, // gid
            nlink,
            mtime.max(0) as u64 & 0xFFFF_FFFF,
            filesize,
            0, // devmajor
            0, // devminor
            0, // rdevmajor
            0, // rdevminor
            namesize,
            0, // check (unused in newc)
        ] {
            header.push_str(&format!("{:08x}", value & 0xFFFF_FFFF));
        }

        let sink = self.sink_mut()?;
        sink.write_all(header.as_bytes())?;
        sink.write_all(name.as_bytes())?;
        sink.write_all(&[0u8])?;
        let pad = pad4(HEADER_SIZE as u64 + namesize);
        if pad > 0 {
            sink.write_all(&vec![0u8; pad as usize])?;
        }
        Ok(())
    }
}

impl WriteSession for CpioWriteSession {
    fn write_entry(&mut self, entry: &EntryHeader) -> Result<()> {
        self.close_entry()?;
        let mtime = entry.mtime.unwrap_or(0);
        match &entry.kind {
            EntryKind::File => {
                let mode = S_IFREG | entry.mode.unwrap_or(0o644);
                self.write_header(&entry.path, mode, 1, mtime, entry.size)?;
                self.remaining = entry.size;
                self.padding = pad4(entry.size);
            }
            EntryKind::Directory => {
                let mode = S_IFDIR | entry.mode.unwrap_or(0o755);
                let path = entry.path.trim_end_matches('/');
                self.write_header(path, mode, 2, mtime, 0)?;
            }
            EntryKind::Symlink { target } => {
                let mode = S_IFLNK | entry.mode.unwrap_or(0o777);
                self.write_header(&entry.path, mode, 1, mtime, target.len() as u64)?;
                let sink = self.sink_mut()?;
                sink.write_all(target.as_bytes())?;
                let pad = pad4(target.len() as u64);
                if pad > 0 {
                    sink.write_all(&vec![0u8; pad as usize])?;
                }
            }
            EntryKind::Other => {}
        }
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
        self.write_header(TRAILER, 0, 1, 0, 0)?;
        let sink = self.sink.take().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "cpio write session already finished",
            ))
        })?;
        sink.finish()
    }
}
