//! Local file header parsing for zip entries.
//!
//! Used in two places: extraction at an indexer-supplied offset (read one
//! header, then stream the payload) and the sequential walker that serves
//! as the generic zip read path when the central directory is unusable.

use std::io::{self, Read};

use super::reader::SliceReader;
use super::{
    CENTRAL_ENTRY_SIGNATURE, EOCD_SIGNATURE, LOCAL_HEADER_SIGNATURE, ZIP32_SENTINEL,
    ZIP64_EXTRA_TAG,
};
use crate::{Error, Result};

/// Compression method: stored (no compression).
pub const METHOD_STORED: u16 = 0;

/// Compression method: deflate.
pub const METHOD_DEFLATED: u16 = 8;

/// Flag bit 3: sizes and CRC live in a trailing data descriptor.
const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;

/// Flag bit 11: the filename is encoded as UTF-8.
const FLAG_UTF8_NAME: u16 = 1 << 11;

/// A parsed zip local file header.
#[derive(Debug, Clone)]
pub struct LocalHeader {
    /// Entry path, forward-slash normalized.
    pub path: String,
    /// Raw filename bytes as stored in the archive.
    pub raw_name: Vec<u8>,
    /// General-purpose flag bits.
    pub flags: u16,
    /// Compression method identifier.
    pub method: u16,
    /// CRC-32 of the uncompressed payload (0 with a data descriptor).
    pub crc32: u32,
    /// Compressed payload length.
    pub compressed_size: u64,
    /// Uncompressed payload length.
    pub size: u64,
}

impl LocalHeader {
    /// True if the payload length is only known from a trailing
    /// descriptor, which sequential reading cannot use.
    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0 && self.compressed_size == 0
    }

    /// True if the filename is declared UTF-8.
    pub fn utf8_name(&self) -> bool {
        self.flags & FLAG_UTF8_NAME != 0
    }

    /// Directory entries are stored with a trailing slash.
    pub fn is_directory(&self) -> bool {
        self.path.ends_with('/')
    }
}

/// Reads the next local file header from a sequential stream.
///
/// Returns `Ok(None)` at the end of the entry run: a central-directory or
/// EOCD signature, or clean end of file. Any other signature is a parse
/// error.
pub fn read_local_header<R: Read>(r: &mut R) -> Result<Option<LocalHeader>> {
    let mut sig_bytes = [0u8; 4];
    match r.read_exact(&mut sig_bytes) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(Error::Io(e)),
    }
    let sig = u32::from_le_bytes(sig_bytes);
    if sig == CENTRAL_ENTRY_SIGNATURE || sig == EOCD_SIGNATURE {
        return Ok(None);
    }
    if sig != LOCAL_HEADER_SIGNATURE {
        return Err(Error::Parse {
            offset: 0,
            reason: format!("expected local file header signature, got {:#010x}", sig),
        });
    }

    let mut fixed = [0u8; 26];
    r.read_exact(&mut fixed)?;
    let mut f = SliceReader::new(&fixed);
    f.skip(2)?; // version needed
    let flags = f.read_u16()?;
    let method = f.read_u16()?;
    f.skip(2)?; // modification time
    f.skip(2)?; // modification date
    let crc32 = f.read_u32()?;
    let compressed_32 = f.read_u32()?;
    let size_32 = f.read_u32()?;
    let name_len = f.read_u16()? as usize;
    let extra_len = f.read_u16()? as usize;

    let mut raw_name = vec![0u8; name_len];
    r.read_exact(&mut raw_name)?;
    let mut extra = vec![0u8; extra_len];
    r.read_exact(&mut extra)?;

    let mut size = size_32 as u64;
    let mut compressed_size = compressed_32 as u64;
    if size_32 == ZIP32_SENTINEL || compressed_32 == ZIP32_SENTINEL {
        apply_zip64(&extra, &mut size, &mut compressed_size)?;
    }

    let path = String::from_utf8_lossy(&raw_name).into_owned();
    let path = if path.contains('\\') {
        path.replace('\\', "/")
    } else {
        path
    };

    Ok(Some(LocalHeader {
        path,
        raw_name,
        flags,
        method,
        crc32,
        compressed_size,
        size,
    }))
}

/// Local-header zip64 extra carries (uncompressed, compressed) slots for
/// whichever fixed fields are sentinel, in that order.
fn apply_zip64(extra: &[u8], size: &mut u64, compressed_size: &mut u64) -> Result<()> {
    let mut r = SliceReader::new(extra);
    while r.remaining() >= 4 {
        let tag = r.read_u16()?;
        let len = r.read_u16()? as usize;
        if tag != ZIP64_EXTRA_TAG {
            r.skip(len)?;
            continue;
        }
        let mut field = SliceReader::new(r.read_bytes(len)?);
        if *size == ZIP32_SENTINEL as u64 {
            *size = field.read_u64()?;
        }
        if *compressed_size == ZIP32_SENTINEL as u64 {
            *compressed_size = field.read_u64()?;
        }
        return Ok(());
    }
    Err(Error::Parse {
        offset: 0,
        reason: "sentinel field present but zip64 extra field missing".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    pub(crate) fn local_entry(name: &str, method: u16, crc: u32, payload: &[u8]) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&LOCAL_HEADER_SIGNATURE.to_le_bytes());
        v.extend_from_slice(&20u16.to_le_bytes()); // version needed
        v.extend_from_slice(&0u16.to_le_bytes()); // flags
        v.extend_from_slice(&method.to_le_bytes());
        v.extend_from_slice(&[0u8; 4]); // time, date
        v.extend_from_slice(&crc.to_le_bytes());
        v.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        v.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        v.extend_from_slice(&(name.len() as u16).to_le_bytes());
        v.extend_from_slice(&0u16.to_le_bytes()); // extra
        v.extend_from_slice(name.as_bytes());
        v.extend_from_slice(payload);
        v
    }

    #[test]
    fn test_read_stored_header() {
        let data = local_entry("a.txt", METHOD_STORED, 0x1234, b"abc");
        let mut cur = Cursor::new(data);
        let header = read_local_header(&mut cur).unwrap().unwrap();
        assert_eq!(header.path, "a.txt");
        assert_eq!(header.method, METHOD_STORED);
        assert_eq!(header.crc32, 0x1234);
        assert_eq!(header.size, 3);
        assert_eq!(header.compressed_size, 3);
        assert!(!header.is_directory());
    }

    #[test]
    fn test_directory_entry() {
        let data = local_entry("dir/", METHOD_STORED, 0, b"");
        let header = read_local_header(&mut Cursor::new(data)).unwrap().unwrap();
        assert!(header.is_directory());
    }

    #[test]
    fn test_central_signature_ends_run() {
        let data = CENTRAL_ENTRY_SIGNATURE.to_le_bytes().to_vec();
        assert!(read_local_header(&mut Cursor::new(data)).unwrap().is_none());
    }

    #[test]
    fn test_eof_ends_run() {
        assert!(
            read_local_header(&mut Cursor::new(Vec::new()))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_garbage_signature_is_parse_error() {
        let data = vec![0xDE, 0xAD, 0xBE, 0xEF];
        let err = read_local_header(&mut Cursor::new(data)).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }
}
