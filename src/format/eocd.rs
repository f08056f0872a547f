//! End-of-central-directory location, including the Zip64 extension chain.

use std::io::{Read, Seek, SeekFrom};

use super::reader::SliceReader;
use super::{
    EOCD_MIN_SIZE, EOCD_SIGNATURE, ZIP32_SENTINEL, ZIP64_EOCD_SIGNATURE, ZIP64_LOCATOR_SIGNATURE,
};
use crate::{Error, Result};

/// How far behind the EOCD record the Zip64 locator is searched for.
///
/// The locator normally sits immediately before the EOCD. This bound is a
/// heuristic, not a correctness guarantee; exceeding it fails soft into
/// the generic fallback rather than hard.
const LOCATOR_SCAN_BOUND: u64 = 1024;

/// Largest possible distance of the EOCD signature from end of file:
/// record size plus a maximal trailing comment.
const MAX_EOCD_SEARCH: u64 = EOCD_MIN_SIZE as u64 + u16::MAX as u64;

/// Resolved position of the central directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CentralDirectoryLocation {
    /// Byte offset of the first central-directory entry.
    pub offset: u64,
    /// Total size of the central directory in bytes.
    pub size: u64,
    /// Number of entries the trailer claims.
    pub entry_count: u64,
}

/// Locates the central directory by backward signature scan.
///
/// Reads trailing bytes in growing windows, starting at the minimum EOCD
/// record size, searching backward for the EOCD signature; a candidate is
/// accepted only if its comment-length field spans exactly to end of file.
/// When the 32-bit size or offset fields carry the overflow sentinel, the
/// Zip64 locator and record are consulted for the 64-bit values.
///
/// # Errors
///
/// - [`Error::Parse`] when no EOCD signature is found (not a zip, or
///   damaged beyond the trailer).
/// - [`Error::DirectoryUnreadable`] when the Zip64 chain is required but
///   missing or does not carry the expected record signature, which
///   usually means a compressed or encrypted directory. Callers must use
///   the generic streaming path for both cases.
pub fn find_central_directory<R: Read + Seek>(source: &mut R) -> Result<CentralDirectoryLocation> {
    let file_len = source.seek(SeekFrom::End(0))?;
    let (eocd_buf, eocd_file_offset) = find_eocd(source, file_len)?;

    let mut r = SliceReader::new(&eocd_buf);
    r.skip(4)?; // signature, already matched
    r.skip(2)?; // disk number
    r.skip(2)?; // central directory disk
    r.skip(2)?; // entries on this disk
    let entry_count = r.read_u16()? as u64;
    let cd_size = r.read_u32()?;
    let cd_offset = r.read_u32()?;

    if cd_size != ZIP32_SENTINEL && cd_offset != ZIP32_SENTINEL {
        return Ok(CentralDirectoryLocation {
            offset: cd_offset as u64,
            size: cd_size as u64,
            entry_count,
        });
    }

    read_zip64_chain(source, eocd_file_offset)
}

/// Finds the EOCD record bytes and its absolute file offset.
fn find_eocd<R: Read + Seek>(source: &mut R, file_len: u64) -> Result<(Vec<u8>, u64)> {
    if file_len < EOCD_MIN_SIZE as u64 {
        return Err(Error::Parse {
            offset: 0,
            reason: "file too small for an end-of-central-directory record".into(),
        });
    }

    let signature = EOCD_SIGNATURE.to_le_bytes();
    // Growing windows guard against a variable-length trailing comment
    // without reading 64KB for the common comment-free case.
    for window in [EOCD_MIN_SIZE as u64, 1024, MAX_EOCD_SEARCH] {
        let window = window.min(file_len);
        let start = file_len - window;
        source.seek(SeekFrom::Start(start))?;
        let mut buf = vec![0u8; window as usize];
        source.read_exact(&mut buf)?;

        for i in (0..=buf.len().saturating_sub(EOCD_MIN_SIZE)).rev() {
            if buf[i..i + 4] != signature {
                continue;
            }
            let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;
            if i + EOCD_MIN_SIZE + comment_len == buf.len() {
                return Ok((buf[i..].to_vec(), start + i as u64));
            }
        }

        if window == file_len {
            break;
        }
    }

    Err(Error::Parse {
        offset: file_len,
        reason: "end-of-central-directory signature not found".into(),
    })
}

/// Follows the Zip64 locator to the 64-bit central-directory fields.
fn read_zip64_chain<R: Read + Seek>(
    source: &mut R,
    eocd_offset: u64,
) -> Result<CentralDirectoryLocation> {
    let scan_len = eocd_offset.min(LOCATOR_SCAN_BOUND);
    if scan_len < 20 {
        return Err(Error::DirectoryUnreadable {
            reason: "zip64 sentinel present but no room for a locator".into(),
        });
    }
    let scan_start = eocd_offset - scan_len;
    source.seek(SeekFrom::Start(scan_start))?;
    let mut buf = vec![0u8; scan_len as usize];
    source.read_exact(&mut buf)?;

    let signature = ZIP64_LOCATOR_SIGNATURE.to_le_bytes();
    let locator_pos = (0..=buf.len() - 20)
        .rev()
        .find(|&i| buf[i..i + 4] == signature);
    let Some(locator_pos) = locator_pos else {
        // Fail soft: the bound is tunable, not a correctness guarantee.
        return Err(Error::DirectoryUnreadable {
            reason: "zip64 locator not found within scan bound".into(),
        });
    };

    let mut r = SliceReader::new(&buf[locator_pos..]);
    r.skip(4)?; // signature
    r.skip(4)?; // disk with the zip64 EOCD
    let zip64_eocd_offset = r.read_u64()?;

    // The record precedes the locator, so its 56 fixed bytes must fit
    // before the trailer; a claimed offset past that is garbage.
    let record_fits = zip64_eocd_offset
        .checked_add(56)
        .is_some_and(|end| end <= eocd_offset);
    if !record_fits {
        return Err(Error::DirectoryUnreadable {
            reason: "zip64 locator points past the trailer".into(),
        });
    }

    source.seek(SeekFrom::Start(zip64_eocd_offset))?;
    let mut record = [0u8; 56];
    source.read_exact(&mut record)?;

    let mut r = SliceReader::new(&record);
    if r.read_u32()? != ZIP64_EOCD_SIGNATURE {
        // The locator pointed at something else entirely, which is what
        // compressed or encrypted central directories look like from here.
        return Err(Error::DirectoryUnreadable {
            reason: "central directory is compressed or encrypted".into(),
        });
    }
    r.skip(8)?; // record size
    r.skip(2)?; // version made by
    r.skip(2)?; // version needed
    r.skip(4)?; // disk number
    r.skip(4)?; // central directory disk
    r.skip(8)?; // entries on this disk
    let entry_count = r.read_u64()?;
    let size = r.read_u64()?;
    let offset = r.read_u64()?;

    Ok(CentralDirectoryLocation {
        offset,
        size,
        entry_count,
    })
}
