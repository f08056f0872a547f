//! Zip driver.
//!
//! The read side is a sequential local-header walker over the raw format
//! module, inflating deflate payloads with `flate2` and verifying CRC-32
//! with `crc32fast`. It deliberately ignores the central directory, which
//! makes it the fallback path when the directory is unusable. The write
//! side delegates container encoding to the `zip` crate.

use std::io::{Read, Seek, SeekFrom, Write};

use flate2::{Decompress, FlushDecompress, Status};
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use super::{Driver, EntryHeader, EntryKind, ReadSession, WriteSession};
use crate::adapter::{SourceReader, SourceWriter};
use crate::format::local::{METHOD_DEFLATED, METHOD_STORED, read_local_header};
use crate::timestamp::dos_datetime;
use crate::{Error, Result};

/// Compressed-input window for the inflater.
const INFLATE_IN_BUF: usize = 64 * 1024;

/// Driver for `.zip`, `.jar`, and `.epub` containers.
pub struct ZipDriver;

impl Driver for ZipDriver {
    fn open_read(&self, source: SourceReader) -> Result<Box<dyn ReadSession>> {
        Ok(Box::new(ZipReadSession::new(source)))
    }

    fn open_write(&self, sink: SourceWriter) -> Result<Box<dyn WriteSession>> {
        Ok(Box::new(ZipWriteSession::new(sink)))
    }
}

/// Decode state of the current entry payload.
enum Payload {
    None,
    Stored {
        remaining: u64,
    },
    Deflated {
        inflater: Decompress,
        /// Compressed bytes not yet pulled from the source.
        raw_remaining: u64,
        buf: Vec<u8>,
        buf_pos: usize,
        buf_len: usize,
        finished: bool,
    },
}

/// Sequential zip reader built on local file headers only.
pub struct ZipReadSession {
    source: SourceReader,
    payload: Payload,
    hasher: crc32fast::Hasher,
    expected_crc: Option<u32>,
    crc_checked: bool,
    current_path: String,
    /// Central-directory sizes for the next header, consumed once.
    pending_sizes: Option<(u64, u64)>,
}

impl ZipReadSession {
    pub(crate) fn new(source: SourceReader) -> Self {
        Self {
            source,
            payload: Payload::None,
            hasher: crc32fast::Hasher::new(),
            expected_crc: None,
            crc_checked: true,
            current_path: String::new(),
            pending_sizes: None,
        }
    }

    /// A session positioned at an indexed local header, carrying the
    /// central directory's sizes for that entry. Streaming writers defer
    /// sizes to a trailing data descriptor; the directory values make
    /// such an entry readable where a bare walk cannot size it.
    pub(crate) fn with_directory_sizes(
        source: SourceReader,
        size: u64,
        compressed_size: u64,
    ) -> Self {
        let mut session = Self::new(source);
        session.pending_sizes = Some((size, compressed_size));
        session
    }

    /// Seeks past whatever is left of the current payload.
    fn skip_payload(&mut self) -> Result<()> {
        let unpulled = match &self.payload {
            Payload::None => 0,
            Payload::Stored { remaining } => *remaining,
            Payload::Deflated { raw_remaining, .. } => *raw_remaining,
        };
        if unpulled > 0 {
            self.source.seek(SeekFrom::Current(unpulled as i64))?;
        }
        self.payload = Payload::None;
        Ok(())
    }

    fn check_crc(&mut self) -> Result<()> {
        if self.crc_checked {
            return Ok(());
        }
        self.crc_checked = true;
        if let Some(expected) = self.expected_crc.take() {
            let hasher = std::mem::take(&mut self.hasher);
            let actual = hasher.finalize();
            if actual != expected {
                return Err(Error::CrcMismatch {
                    path: self.current_path.clone(),
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }
}

impl ReadSession for ZipReadSession {
    fn next_entry(&mut self) -> Result<Option<EntryHeader>> {
        self.skip_payload()?;
        let known_sizes = self.pending_sizes.take();
        let offset = self.source.stream_position()?;
        let Some(mut header) = read_local_header(&mut self.source)? else {
            return Ok(None);
        };
        let deferred = header.has_data_descriptor();
        if deferred {
            match known_sizes {
                Some((size, compressed_size)) => {
                    header.size = size;
                    header.compressed_size = compressed_size;
                }
                // Sizing the payload would need the descriptor that only
                // follows it; without directory values the walk aborts.
                None => {
                    return Err(Error::Parse {
                        offset,
                        reason: "entry sizes deferred to a data descriptor".into(),
                    });
                }
            }
        }

        self.payload = match header.method {
            METHOD_STORED => Payload::Stored {
                remaining: header.compressed_size,
            },
            METHOD_DEFLATED => Payload::Deflated {
                inflater: Decompress::new(false),
                raw_remaining: header.compressed_size,
                buf: vec![0u8; INFLATE_IN_BUF],
                buf_pos: 0,
                buf_len: 0,
                finished: header.compressed_size == 0,
            },
            other => {
                return Err(Error::Codec(format!(
                    "unsupported zip compression method {} for '{}'",
                    other, header.path
                )));
            }
        };
        self.hasher = crc32fast::Hasher::new();
        // For deferred entries the local CRC field is zero and the real
        // value trails the payload; verification is skipped.
        self.expected_crc = (!deferred).then_some(header.crc32);
        self.crc_checked = false;
        self.current_path = header.path.clone();

        let kind = if header.is_directory() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        Ok(Some(EntryHeader {
            path: header.path,
            size: header.size,
            compressed_size: header.compressed_size,
            header_offset: offset,
            kind,
            mode: None,
            mtime: None,
        }))
    }

    fn read_block(&mut self, out: &mut [u8]) -> Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        let n = match &mut self.payload {
            Payload::None => 0,
            Payload::Stored { remaining } => {
                let want = (*remaining).min(out.len() as u64) as usize;
                if want == 0 {
                    0
                } else {
                    let n = self.source.read(&mut out[..want])?;
                    if n == 0 {
                        return Err(Error::Parse {
                            offset: 0,
                            reason: "payload truncated before declared size".into(),
                        });
                    }
                    *remaining -= n as u64;
                    n
                }
            }
            Payload::Deflated {
                inflater,
                raw_remaining,
                buf,
                buf_pos,
                buf_len,
                finished,
            } => loop {
                if *finished {
                    break 0;
                }
                if *buf_pos == *buf_len && *raw_remaining > 0 {
                    let want = (*raw_remaining).min(buf.len() as u64) as usize;
                    let n = self.source.read(&mut buf[..want])?;
                    if n == 0 {
                        return Err(Error::Parse {
                            offset: 0,
                            reason: "payload truncated before declared size".into(),
                        });
                    }
                    *raw_remaining -= n as u64;
                    *buf_pos = 0;
                    *buf_len = n;
                }
                let input = &buf[*buf_pos..*buf_len];
                let before_in = inflater.total_in();
                let before_out = inflater.total_out();
                let status = inflater
                    .decompress(input, out, FlushDecompress::None)
                    .map_err(|e| Error::Codec(format!("inflate failed: {}", e)))?;
                *buf_pos += (inflater.total_in() - before_in) as usize;
                let produced = (inflater.total_out() - before_out) as usize;
                if status == Status::StreamEnd {
                    *finished = true;
                }
                if produced > 0 {
                    break produced;
                }
                if *finished {
                    break 0;
                }
                if *buf_pos == *buf_len && *raw_remaining == 0 {
                    return Err(Error::Parse {
                        offset: 0,
                        reason: "deflate stream ended before compressed size".into(),
                    });
                }
            },
        };
        if n == 0 {
            self.check_crc()?;
        } else {
            self.hasher.update(&out[..n]);
        }
        Ok(n)
    }
}

/// Write session delegating to [`zip::ZipWriter`].
pub struct ZipWriteSession {
    writer: ZipWriter<SourceWriter>,
    in_file: bool,
}

impl ZipWriteSession {
    pub(crate) fn new(sink: SourceWriter) -> Self {
        Self {
            writer: ZipWriter::new(sink),
            in_file: false,
        }
    }
}

impl WriteSession for ZipWriteSession {
    fn write_entry(&mut self, header: &EntryHeader) -> Result<()> {
        let mut options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(header.size >= u32::MAX as u64);
        if let Some(mode) = header.mode {
            options = options.unix_permissions(mode);
        }
        if let Some(dt) = header.mtime.and_then(dos_datetime) {
            options = options.last_modified_time(dt);
        }

        self.in_file = false;
        match &header.kind {
            EntryKind::File => {
                self.writer.start_file(header.path.as_str(), options)?;
                self.in_file = true;
            }
            EntryKind::Directory => {
                self.writer.add_directory(header.path.as_str(), options)?;
            }
            EntryKind::Symlink { target } => {
                self.writer
                    .add_symlink(header.path.as_str(), target.as_str(), options)?;
            }
            EntryKind::Other => {}
        }
        Ok(())
    }

    fn write_block(&mut self, data: &[u8]) -> Result<usize> {
        if !self.in_file {
            return Err(Error::Codec(
                "payload bytes outside a file entry".into(),
            ));
        }
        Ok(self.writer.write(data)?)
    }

    fn finish(self: Box<Self>) -> Result<u64> {
        let session = *self;
        let sink = session.writer.finish()?;
        sink.finish()
    }
}
