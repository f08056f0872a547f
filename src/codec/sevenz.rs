//! 7z container driver (read-only), delegating to the `sevenz-rust`
//! crate.
//!
//! 7z groups payloads into solid compression blocks, so entries cannot
//! be decoded independently the way zip locals can. The session decodes
//! the whole archive up front and serves entries from memory; listing
//! order is the container's own. Writing 7z containers is not bundled,
//! so [`SevenZDriver::open_write`] always fails.

use std::io::{Read, Seek, SeekFrom};

use super::{Driver, EntryHeader, EntryKind, ReadSession, WriteSession};
use crate::adapter::{SourceReader, SourceWriter};
use crate::{Error, Result};

/// Read-only driver for `.7z` containers.
pub struct SevenZDriver;

impl Driver for SevenZDriver {
    fn open_read(&self, mut source: SourceReader) -> Result<Box<dyn ReadSession>> {
        let len = source.seek(SeekFrom::End(0))?;
        source.seek(SeekFrom::Start(0))?;
        let mut reader = sevenz_rust::SevenZReader::new(source, len, sevenz_rust::Password::empty())
            .map_err(|e| Error::Codec(format!("7z open failed: {}", e)))?;

        let mut entries: Vec<(EntryHeader, Vec<u8>)> = Vec::new();
        // Payload read failures inside the visitor are carried out here;
        // the visitor signals an early stop instead of wrapping them in
        // the backend's error type.
        let mut failure: Option<std::io::Error> = None;
        reader
            .for_each_entries(|entry, payload| {
                let kind = if entry.is_directory() {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                };
                let mut data = Vec::new();
                if kind == EntryKind::File {
                    if let Err(e) = payload.read_to_end(&mut data) {
                        failure = Some(e);
                        return Ok(false);
                    }
                }
                let header = EntryHeader {
                    path: entry.name().replace('\\', "/"),
                    size: data.len() as u64,
                    compressed_size: data.len() as u64,
                    header_offset: 0,
                    kind,
                    mode: None,
                    mtime: None,
                };
                entries.push((header, data));
                Ok(true)
            })
            .map_err(|e| Error::Codec(format!("7z decode failed: {}", e)))?;
        if let Some(e) = failure {
            return Err(Error::Io(e));
        }

        Ok(Box::new(SevenZReadSession {
            entries: entries.into_iter(),
            payload: Vec::new(),
            pos: 0,
        }))
    }

    fn open_write(&self, _sink: SourceWriter) -> Result<Box<dyn WriteSession>> {
        Err(Error::Codec("7z containers are read-only".into()))
    }
}

/// Serves pre-decoded 7z entries through the pull-based contract.
struct SevenZReadSession {
    entries: std::vec::IntoIter<(EntryHeader, Vec<u8>)>,
    payload: Vec<u8>,
    pos: usize,
}

impl ReadSession for SevenZReadSession {
    fn next_entry(&mut self) -> Result<Option<EntryHeader>> {
        match self.entries.next() {
            Some((header, data)) => {
                self.payload = data;
                self.pos = 0;
                Ok(Some(header))
            }
            None => {
                self.payload = Vec::new();
                self.pos = 0;
                Ok(None)
            }
        }
    }

    fn read_block(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = buf.len().min(self.payload.len() - self.pos);
        buf[..n].copy_from_slice(&self.payload[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn fixture_7z(dir: &TempDir) -> std::path::PathBuf {
        let src = dir.path().join("tree");
        std::fs::create_dir_all(src.join("sub")).unwrap();
        std::fs::write(src.join("a.txt"), b"alpha").unwrap();
        std::fs::write(src.join("sub").join("b.txt"), b"beta").unwrap();
        let path = dir.path().join("tree.7z");
        sevenz_rust::compress_to_path(&src, &path).unwrap();
        path
    }

    #[test]
    fn test_lists_and_reads_entries() {
        let dir = TempDir::new().unwrap();
        let path = fixture_7z(&dir);

        let mut session = SevenZDriver
            .open_read(SourceReader::open_path(&path).unwrap())
            .unwrap();
        let mut files = BTreeMap::new();
        while let Some(entry) = session.next_entry().unwrap() {
            if entry.kind != EntryKind::File {
                continue;
            }
            let mut data = Vec::new();
            let mut buf = [0u8; 3];
            loop {
                let n = session.read_block(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                data.extend_from_slice(&buf[..n]);
            }
            assert_eq!(entry.size, data.len() as u64);
            files.insert(entry.path.clone(), data);
        }
        assert_eq!(files.get("a.txt").map(Vec::as_slice), Some(&b"alpha"[..]));
        assert_eq!(files.get("sub/b.txt").map(Vec::as_slice), Some(&b"beta"[..]));
    }

    #[test]
    fn test_write_is_refused() {
        let dir = TempDir::new().unwrap();
        let sink = SourceWriter::create_path(dir.path().join("out.7z")).unwrap();
        let err = SevenZDriver.open_write(sink).unwrap_err();
        assert!(matches!(err, Error::Codec(_)));
    }

    #[test]
    fn test_garbage_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bogus.7z");
        std::fs::write(&path, b"this is not a seven zip container").unwrap();
        let source = SourceReader::open_path(&path).unwrap();
        assert!(SevenZDriver.open_read(source).is_err());
    }
}
