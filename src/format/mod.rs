//! Raw ZIP binary format parsing.
//!
//! This module implements the fast listing path from raw bytes: locating
//! the end-of-central-directory record (with Zip64 extensions), walking the
//! central directory into an in-memory entry table, and reading single
//! local file headers at known offsets. None of it touches the generic
//! codec machinery, which is what makes indexer-based listing and
//! single-entry extraction cheap.
//!
//! Any parse inconsistency aborts the whole listing with an error rather
//! than returning a partial table; callers then fall back to the generic
//! streaming path.

pub mod eocd;
pub mod index;
pub mod local;
pub mod reader;

pub use eocd::{CentralDirectoryLocation, find_central_directory};
pub use index::index_archive;
pub use local::LocalHeader;
pub use reader::SliceReader;

/// End-of-central-directory record signature (`PK\x05\x06`).
pub const EOCD_SIGNATURE: u32 = 0x0605_4b50;

/// Zip64 end-of-central-directory locator signature (`PK\x06\x07`).
pub const ZIP64_LOCATOR_SIGNATURE: u32 = 0x0706_4b50;

/// Zip64 end-of-central-directory record signature (`PK\x06\x06`).
pub const ZIP64_EOCD_SIGNATURE: u32 = 0x0606_4b50;

/// Central-directory entry signature (`PK\x01\x02`).
pub const CENTRAL_ENTRY_SIGNATURE: u32 = 0x0201_4b50;

/// Local file header signature (`PK\x03\x04`).
pub const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;

/// Minimum size of the end-of-central-directory record.
pub const EOCD_MIN_SIZE: usize = 22;

/// 32-bit overflow sentinel: the true value lives in the Zip64 extra field.
pub const ZIP32_SENTINEL: u32 = 0xFFFF_FFFF;

/// Zip64 extensible-data tag carrying 64-bit size/offset overrides.
pub const ZIP64_EXTRA_TAG: u16 = 0x0001;

/// One row of an archive listing.
///
/// Produced by the central-directory indexer or by iterating headers
/// through a generic read session. Immutable once built; the table lives
/// for one listing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    /// Entry path, forward-slash normalized.
    pub path: String,
    /// Uncompressed size in bytes.
    pub size: u64,
    /// Compressed (stored) size in bytes.
    pub compressed_size: u64,
    /// Byte offset of the entry's local header within the archive file.
    pub header_offset: u64,
}
