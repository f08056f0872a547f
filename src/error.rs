//! Error types for archive operations.
//!
//! This module provides the [`Error`] enum which represents all possible
//! failure modes when listing, extracting, packing, or rewriting archives,
//! along with a convenient [`Result<T>`] type alias.
//!
//! # Error Handling
//!
//! All fallible operations in this crate return `Result<T, Error>`. You can
//! handle errors using pattern matching or the `?` operator:
//!
//! ```rust,no_run
//! use omniarc::{Archive, Error};
//!
//! fn list(path: &str) -> omniarc::Result<()> {
//!     match Archive::open(path) {
//!         Ok(archive) => {
//!             for entry in archive.entries() {
//!                 println!("{}: {} bytes", entry.path, entry.size);
//!             }
//!             Ok(())
//!         }
//!         Err(Error::UnsupportedFormat { extension }) => {
//!             eprintln!("no driver registered for '.{}'", extension);
//!             Err(Error::UnsupportedFormat { extension })
//!         }
//!         Err(e) => Err(e),
//!     }
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants | Typical cause |
//! |----------|----------|---------------|
//! | I/O | [`Io`][Error::Io] | File system operations |
//! | Format | [`Parse`][Error::Parse], [`DirectoryUnreadable`][Error::DirectoryUnreadable] | Malformed archive bytes |
//! | Compatibility | [`UnsupportedFormat`][Error::UnsupportedFormat] | No driver for a suffix |
//! | Policy | [`PolicyRejected`][Error::PolicyRejected] | Reserved archive types |
//! | Rewrite | [`RewriteRead`][Error::RewriteRead], [`RewriteWrite`][Error::RewriteWrite] | Failed surgery, rolled back |

use std::io;

/// The main error type for archive operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred during file operations.
    ///
    /// This wraps [`std::io::Error`] and is returned when an open, read,
    /// write, or seek against the underlying file fails. For surgery
    /// operations the original archive is left untouched when this occurs.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Binary archive data could not be parsed.
    ///
    /// Raised by the ZIP central-directory indexer and the raw header
    /// readers when a signature is missing, a claimed length exceeds the
    /// remaining buffer, or a record is truncated. The offset is relative
    /// to the structure being parsed. Listing callers treat this as a
    /// signal to fall back to the generic streaming path.
    #[error("parse error at offset {offset:#x}: {reason}")]
    Parse {
        /// Byte offset where the inconsistency was detected.
        offset: u64,
        /// A description of what was expected vs. found.
        reason: String,
    },

    /// The ZIP central directory exists but cannot be walked.
    ///
    /// Returned when the end-of-central-directory record points at data
    /// that does not start with a central-directory entry signature,
    /// which usually means the directory is compressed or encrypted.
    /// Distinct from [`Parse`][Error::Parse] so callers know the whole
    /// fast path, not just the Zip64 branch, must be bypassed.
    #[error("central directory unreadable: {reason}")]
    DirectoryUnreadable {
        /// Why the directory cannot be used.
        reason: String,
    },

    /// No codec driver is registered for the file's suffix.
    #[error("unsupported archive format: .{extension}")]
    UnsupportedFormat {
        /// The suffix that had no registered driver.
        extension: String,
    },

    /// The requested entry does not exist in the archive.
    #[error("entry not found: {path}")]
    EntryNotFound {
        /// The path that was requested.
        path: String,
    },

    /// An entry with this path already exists.
    #[error("entry already exists: {path}")]
    EntryExists {
        /// The conflicting path.
        path: String,
    },

    /// An archive-relative path is invalid.
    ///
    /// Paths must be relative, must not contain `..` components, and are
    /// normalized to forward slashes.
    #[error("invalid archive path: {0}")]
    InvalidPath(String),

    /// Modification of a reserved archive type was rejected.
    ///
    /// Surgery refuses, before opening any file, to rewrite archives whose
    /// suffix marks them as collection index files. See
    /// [`EditPolicy`](crate::edit::EditPolicy).
    #[error("refusing to modify reserved archive: {path}")]
    PolicyRejected {
        /// The archive path that was rejected.
        path: String,
    },

    /// Archive rewrite failed while reading the source.
    ///
    /// The temporary output file has been deleted and the original archive
    /// is byte-for-byte unchanged.
    #[error("archive rewrite aborted (read side): {source}")]
    RewriteRead {
        /// The underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// Archive rewrite failed while writing the replacement.
    ///
    /// The temporary output file has been deleted and the original archive
    /// is byte-for-byte unchanged.
    #[error("archive rewrite aborted (write side): {source}")]
    RewriteWrite {
        /// The underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// A codec backend reported a fatal error.
    ///
    /// Wraps errors surfaced by the container format backends (zip, tar)
    /// that are not plain I/O errors.
    #[error("codec error: {0}")]
    Codec(String),

    /// Extracted data failed CRC-32 verification.
    #[error("CRC mismatch for '{path}': expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch {
        /// The entry whose payload failed verification.
        path: String,
        /// CRC recorded in the archive.
        expected: u32,
        /// CRC of the extracted bytes.
        actual: u32,
    },

    /// An entry path would escape the extraction destination.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending archive path.
        path: String,
    },
}

impl Error {
    /// Returns true if a zip listing failure should trigger the generic
    /// streaming fallback instead of surfacing to the caller.
    pub fn needs_fallback(&self) -> bool {
        matches!(
            self,
            Error::Parse { .. } | Error::DirectoryUnreadable { .. }
        )
    }
}

/// A specialized `Result` type for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<zip::result::ZipError> for Error {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::Io(io) => Error::Io(io),
            other => Error::Codec(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = Error::Parse {
            offset: 0x2c,
            reason: "missing central directory signature".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("0x2c"));
        assert!(msg.contains("missing central directory signature"));
    }

    #[test]
    fn test_needs_fallback() {
        assert!(
            Error::Parse {
                offset: 0,
                reason: String::new()
            }
            .needs_fallback()
        );
        assert!(
            Error::DirectoryUnreadable {
                reason: String::new()
            }
            .needs_fallback()
        );
        assert!(!Error::EntryNotFound { path: "a".into() }.needs_fallback());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
