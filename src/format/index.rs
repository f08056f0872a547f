//! Central-directory indexer: the fast listing path for zip archives.

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use super::eocd::find_central_directory;
use super::reader::SliceReader;
use super::{CENTRAL_ENTRY_SIGNATURE, EntryRecord, ZIP32_SENTINEL, ZIP64_EXTRA_TAG};
use crate::adapter::SourceReader;
use crate::{Error, Result};

/// Builds the full entry table of a zip archive from raw bytes.
///
/// Locates the central directory via [`find_central_directory`], reads it
/// wholly into memory, and walks the fixed-layout entries, applying Zip64
/// extensible-data overrides where the 32-bit fields carry the overflow
/// sentinel. Filenames are normalized to forward slashes.
///
/// # Errors
///
/// Any parse inconsistency aborts the whole listing: callers receive
/// [`Error::Parse`] or [`Error::DirectoryUnreadable`] (never a partial
/// table) and must fall back to the generic streaming listing.
pub fn index_archive(path: impl AsRef<Path>) -> Result<Vec<EntryRecord>> {
    let mut source = SourceReader::open_path(path)?;
    index_from(&mut source)
}

/// Indexes from any seekable byte source. Exposed for callers that already
/// hold an open read session.
pub fn index_from<R: Read + Seek>(source: &mut R) -> Result<Vec<EntryRecord>> {
    let file_len = source.seek(SeekFrom::End(0))?;
    let location = find_central_directory(source)?;

    // The trailer can claim any size and offset; both must land inside
    // the file before a directory buffer is allocated or read.
    let in_bounds = location
        .offset
        .checked_add(location.size)
        .is_some_and(|end| end <= file_len);
    if !in_bounds {
        return Err(Error::DirectoryUnreadable {
            reason: format!(
                "central directory ({} bytes at {:#x}) extends past end of file ({} bytes)",
                location.size, location.offset, file_len
            ),
        });
    }

    source.seek(SeekFrom::Start(location.offset))?;
    let mut directory = vec![0u8; location.size as usize];
    source.read_exact(&mut directory)?;

    // The directory must begin with an entry signature; anything else
    // (an encrypted or compressed directory) forces the generic path.
    let signature = CENTRAL_ENTRY_SIGNATURE.to_le_bytes();
    let first = directory
        .windows(4)
        .position(|w| w == signature)
        .ok_or_else(|| Error::DirectoryUnreadable {
            reason: "no central-directory entry signature in directory block".into(),
        })?;

    let mut r = SliceReader::new(&directory[first..]);
    let mut entries = Vec::new();
    while r.remaining() >= 4 {
        let record_start = r.position() as u64;
        let sig = r.read_u32()?;
        if sig != CENTRAL_ENTRY_SIGNATURE {
            return Err(Error::Parse {
                offset: record_start,
                reason: format!("expected central-directory entry signature, got {:#010x}", sig),
            });
        }
        entries.push(parse_entry(&mut r, record_start)?);
    }

    Ok(entries)
}

/// Parses one central-directory entry; the signature is already consumed.
fn parse_entry(r: &mut SliceReader<'_>, record_start: u64) -> Result<EntryRecord> {
    r.skip(2)?; // version made by
    r.skip(2)?; // version needed
    r.skip(2)?; // general-purpose flags
    r.skip(2)?; // compression method
    r.skip(2)?; // modification time
    r.skip(2)?; // modification date
    r.skip(4)?; // crc-32
    let compressed_32 = r.read_u32()?;
    let size_32 = r.read_u32()?;
    let name_len = r.read_u16()? as usize;
    let extra_len = r.read_u16()? as usize;
    let comment_len = r.read_u16()? as usize;
    r.skip(2)?; // disk number start
    r.skip(2)?; // internal attributes
    r.skip(4)?; // external attributes
    let offset_32 = r.read_u32()?;

    // Claimed variable-length fields must fit the remaining buffer.
    if r.remaining() < name_len + extra_len + comment_len {
        return Err(Error::Parse {
            offset: record_start,
            reason: "entry name/extra/comment lengths exceed directory block".into(),
        });
    }

    let name_bytes = r.read_bytes(name_len)?;
    let extra = r.read_bytes(extra_len)?;
    r.skip(comment_len)?;

    let mut size = size_32 as u64;
    let mut compressed_size = compressed_32 as u64;
    let mut header_offset = offset_32 as u64;

    let sentinels = [size_32, compressed_32, offset_32]
        .iter()
        .any(|&v| v == ZIP32_SENTINEL);
    if sentinels {
        apply_zip64_overrides(
            extra,
            record_start,
            &mut size,
            &mut compressed_size,
            &mut header_offset,
        )?;
    }

    let path = String::from_utf8_lossy(name_bytes).into_owned();
    let path = if path.contains('\\') {
        path.replace('\\', "/")
    } else {
        path
    };

    Ok(EntryRecord {
        path,
        size,
        compressed_size,
        header_offset,
    })
}

/// Reads the Zip64 extensible-data field (tag 0x0001) for a fixed-order
/// override: uncompressed size, then compressed size, then local-header
/// offset, consuming one 8-byte slot per sentinel field present.
fn apply_zip64_overrides(
    extra: &[u8],
    record_start: u64,
    size: &mut u64,
    compressed_size: &mut u64,
    header_offset: &mut u64,
) -> Result<()> {
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
        if *header_offset == ZIP32_SENTINEL as u64 {
            *header_offset = field.read_u64()?;
        }
        return Ok(());
    }
    Err(Error::Parse {
        offset: record_start,
        reason: "sentinel field present but zip64 extra field missing".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{EOCD_SIGNATURE, ZIP64_EXTRA_TAG};
    use std::io::Cursor;

    /// Builds a central-directory entry with optional zip64 extra data.
    fn central_entry(name: &str, size: u32, csize: u32, offset: u32, extra: &[u8]) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&CENTRAL_ENTRY_SIGNATURE.to_le_bytes());
        v.extend_from_slice(&[0u8; 12]); // versions, flags, method, time, date
        v.extend_from_slice(&0u32.to_le_bytes()); // crc
        v.extend_from_slice(&csize.to_le_bytes());
        v.extend_from_slice(&size.to_le_bytes());
        v.extend_from_slice(&(name.len() as u16).to_le_bytes());
        v.extend_from_slice(&(extra.len() as u16).to_le_bytes());
        v.extend_from_slice(&0u16.to_le_bytes()); // comment
        v.extend_from_slice(&[0u8; 8]); // disk, internal, external attrs
        v.extend_from_slice(&offset.to_le_bytes());
        v.extend_from_slice(name.as_bytes());
        v.extend_from_slice(extra);
        v
    }

    fn archive_with_directory(prefix_len: usize, directory: &[u8], entries: u16) -> Vec<u8> {
        let mut data = vec![0u8; prefix_len];
        data.extend_from_slice(directory);
        data.extend_from_slice(&EOCD_SIGNATURE.to_le_bytes());
        data.extend_from_slice(&[0u8; 4]);
        data.extend_from_slice(&entries.to_le_bytes());
        data.extend_from_slice(&entries.to_le_bytes());
        data.extend_from_slice(&(directory.len() as u32).to_le_bytes());
        data.extend_from_slice(&(prefix_len as u32).to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data
    }

    #[test]
    fn test_plain_directory_walk() {
        let mut dir = central_entry("a.txt", 3, 3, 0, &[]);
        dir.extend(central_entry("books/b.fb2", 100, 40, 50, &[]));
        let data = archive_with_directory(120, &dir, 2);

        let entries = index_from(&mut Cursor::new(data)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "a.txt");
        assert_eq!(entries[0].size, 3);
        assert_eq!(entries[1].path, "books/b.fb2");
        assert_eq!(entries[1].compressed_size, 40);
        assert_eq!(entries[1].header_offset, 50);
    }

    #[test]
    fn test_backslash_names_are_normalized() {
        let dir = central_entry("dir\\sub\\x.txt", 1, 1, 0, &[]);
        let data = archive_with_directory(10, &dir, 1);
        let entries = index_from(&mut Cursor::new(data)).unwrap();
        assert_eq!(entries[0].path, "dir/sub/x.txt");
    }

    #[test]
    fn test_zip64_override_consumes_slots_in_order() {
        // All three fields sentinel: slots are (size, csize, offset).
        let mut extra = Vec::new();
        extra.extend_from_slice(&ZIP64_EXTRA_TAG.to_le_bytes());
        extra.extend_from_slice(&24u16.to_le_bytes());
        extra.extend_from_slice(&0x1111_1111_1111u64.to_le_bytes());
        extra.extend_from_slice(&0x2222_2222_2222u64.to_le_bytes());
        extra.extend_from_slice(&0x3333_3333_3333u64.to_le_bytes());

        let dir = central_entry(
            "big.bin",
            ZIP32_SENTINEL,
            ZIP32_SENTINEL,
            ZIP32_SENTINEL,
            &extra,
        );
        let data = archive_with_directory(0, &dir, 1);
        let entries = index_from(&mut Cursor::new(data)).unwrap();
        assert_eq!(entries[0].size, 0x1111_1111_1111);
        assert_eq!(entries[0].compressed_size, 0x2222_2222_2222);
        assert_eq!(entries[0].header_offset, 0x3333_3333_3333);
    }

    #[test]
    fn test_zip64_override_only_sentinel_fields() {
        // Only the compressed size is sentinel: the single slot feeds it.
        let mut extra = Vec::new();
        extra.extend_from_slice(&ZIP64_EXTRA_TAG.to_le_bytes());
        extra.extend_from_slice(&8u16.to_le_bytes());
        extra.extend_from_slice(&0xABCD_EF01u64.to_le_bytes());

        let dir = central_entry("c.bin", 77, ZIP32_SENTINEL, 5, &extra);
        let data = archive_with_directory(0, &dir, 1);
        let entries = index_from(&mut Cursor::new(data)).unwrap();
        assert_eq!(entries[0].size, 77);
        assert_eq!(entries[0].compressed_size, 0xABCD_EF01);
        assert_eq!(entries[0].header_offset, 5);
    }

    #[test]
    fn test_unexpected_directory_content_needs_fallback() {
        // Simulates an encrypted directory: the block the EOCD points at
        // carries no entry signature at all.
        let dir = vec![0xEEu8; 46];
        let data = archive_with_directory(30, &dir, 1);
        let err = index_from(&mut Cursor::new(data)).unwrap_err();
        assert!(matches!(err, Error::DirectoryUnreadable { .. }));
    }

    #[test]
    fn test_oversized_name_length_aborts_listing() {
        let mut dir = central_entry("ok.txt", 1, 1, 0, &[]);
        // Claim a name longer than the remaining block.
        dir[28] = 0xFF;
        dir[29] = 0x7F;
        let data = archive_with_directory(0, &dir, 1);
        let err = index_from(&mut Cursor::new(data)).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_oversized_directory_claim_needs_fallback() {
        let dir = central_entry("a.txt", 1, 1, 0, &[]);
        let mut data = archive_with_directory(0, &dir, 1);
        // Trailer claims a 100 MiB directory in a file of a few dozen
        // bytes; the listing must fail toward the generic path, not
        // allocate or hit end of file.
        let n = data.len();
        data[n - 10..n - 6].copy_from_slice(&(100u32 * 1024 * 1024).to_le_bytes());
        let err = index_from(&mut Cursor::new(data)).unwrap_err();
        assert!(err.needs_fallback());
    }

    #[test]
    fn test_listing_is_idempotent() {
        let mut dir = central_entry("one", 1, 1, 0, &[]);
        dir.extend(central_entry("two", 2, 2, 10, &[]));
        let data = archive_with_directory(40, &dir, 2);

        let first = index_from(&mut Cursor::new(&data)).unwrap();
        let second = index_from(&mut Cursor::new(&data)).unwrap();
        assert_eq!(first, second);
    }
}
