//! The format-agnostic codec boundary.
//!
//! The engine never decodes container formats through anything but this
//! module's traits: a [`Driver`] opens pull-based [`ReadSession`]s and
//! [`WriteSession`]s over the adapter types, and the engine walks entries
//! without knowing which container it is talking to. Compression and
//! container encoding are delegated to backend crates (`zip`, `tar`,
//! `flate2`, `bzip2`, `xz2`, `sevenz-rust`); this crate implements none
//! of it.
//!
//! Format selection is by filename suffix only: the engine hands the
//! suffix to [`driver_for`] and uses whatever driver the lookup returns.

use std::io::Read;
use std::path::Path;

use crate::adapter::{SourceReader, SourceWriter};
use crate::{Error, Result};

pub mod cpio;
#[cfg(feature = "sevenz")]
pub mod sevenz;
pub mod tar;
pub mod zip;

pub use cpio::CpioDriver;
#[cfg(feature = "sevenz")]
pub use sevenz::SevenZDriver;
pub use tar::{TarCompression, TarDriver};
pub use zip::ZipDriver;

/// Payload streaming chunk size (1 MiB).
pub(crate) const CHUNK_SIZE: usize = 1024 * 1024;

/// What an archive entry is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// A regular file with payload bytes.
    File,
    /// A directory; no payload.
    Directory,
    /// A symbolic link to `target`. Only produced when reading; packing
    /// resolves links before anything reaches a write session.
    Symlink {
        /// Link target as stored in the archive.
        target: String,
    },
    /// Device nodes, fifos, and other kinds the engine does not
    /// materialize.
    Other,
}

/// Per-entry metadata crossing the codec boundary in both directions.
#[derive(Debug, Clone)]
pub struct EntryHeader {
    /// Entry path, forward-slash normalized.
    pub path: String,
    /// Uncompressed payload size in bytes.
    pub size: u64,
    /// Stored (compressed) payload size; equals `size` for containers
    /// without compression.
    pub compressed_size: u64,
    /// Byte offset of the entry header within the (decoded) stream.
    pub header_offset: u64,
    /// Entry kind.
    pub kind: EntryKind,
    /// Unix permission bits, when the container records them.
    pub mode: Option<u32>,
    /// Modification time as Unix seconds, when recorded.
    pub mtime: Option<i64>,
}

impl EntryHeader {
    /// Creates a regular-file header with only path and size set.
    pub fn file(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
            compressed_size: size,
            header_offset: 0,
            kind: EntryKind::File,
            mode: None,
            mtime: None,
        }
    }

    /// Creates a directory header.
    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size: 0,
            compressed_size: 0,
            header_offset: 0,
            kind: EntryKind::Directory,
            mode: None,
            mtime: None,
        }
    }
}

/// Pull-based sequential read access to one archive.
///
/// The session owns its adapter; dropping it closes the underlying
/// handle. `next_entry` positions the session at the following header,
/// discarding any unread payload of the current entry.
pub trait ReadSession {
    /// Advances to the next entry header, or `None` at end of archive.
    fn next_entry(&mut self) -> Result<Option<EntryHeader>>;

    /// Reads decoded payload bytes of the current entry. Returns 0 at
    /// end of payload.
    fn read_block(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// Sequential write access to one archive under construction.
pub trait WriteSession {
    /// Commits an entry header. Metadata must be complete before the
    /// first payload block.
    fn write_entry(&mut self, header: &EntryHeader) -> Result<()>;

    /// Appends payload bytes for the current entry. Returns bytes
    /// accepted, which may be short; callers loop until done.
    fn write_block(&mut self, data: &[u8]) -> Result<usize>;

    /// Finalizes the container and returns total bytes written to the
    /// underlying sink.
    fn finish(self: Box<Self>) -> Result<u64>;
}

impl std::fmt::Debug for dyn WriteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn WriteSession")
    }
}

/// A container format backend.
pub trait Driver: Send + Sync {
    /// Opens a read session over an adapter.
    fn open_read(&self, source: SourceReader) -> Result<Box<dyn ReadSession>>;

    /// Opens a write session over an adapter.
    fn open_write(&self, sink: SourceWriter) -> Result<Box<dyn WriteSession>>;
}

impl std::fmt::Debug for dyn Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Driver")
    }
}

/// Returns the archive suffix of `path`, lowercased, with `.tar.*`
/// double suffixes kept intact (`"tar.gz"`, not `"gz"`).
pub fn archive_suffix(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_string_lossy().to_lowercase();
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.ends_with(".tar") {
        Some(format!("tar.{}", ext))
    } else {
        Some(ext.to_string())
    }
}

/// Suffix-keyed driver lookup.
///
/// # Errors
///
/// [`Error::UnsupportedFormat`] when no driver covers the suffix. The
/// engine bundles zip/jar, tar (plain and compressed), cpio, and 7z
/// (read-only); other containers require driving a custom [`Driver`]
/// directly.
pub fn driver_for(path: &Path) -> Result<Box<dyn Driver>> {
    let suffix = archive_suffix(path).unwrap_or_default();
    match suffix.as_str() {
        "zip" | "jar" | "epub" => Ok(Box::new(ZipDriver)),
        #[cfg(feature = "sevenz")]
        "7z" => Ok(Box::new(SevenZDriver)),
        "tar" => Ok(Box::new(TarDriver::new(TarCompression::None))),
        "tar.gz" | "tgz" => Ok(Box::new(TarDriver::new(TarCompression::Gzip))),
        #[cfg(feature = "bzip2")]
        "tar.bz2" | "tbz2" => Ok(Box::new(TarDriver::new(TarCompression::Bzip2))),
        #[cfg(feature = "xz")]
        "tar.xz" | "txz" => Ok(Box::new(TarDriver::new(TarCompression::Xz))),
        "cpio" => Ok(Box::new(CpioDriver)),
        _ => Err(Error::UnsupportedFormat { extension: suffix }),
    }
}

/// Streams one entry payload from `reader` into a write session in fixed
/// chunks, looping on partial writes until each chunk is fully accepted
/// or a hard error occurs. Returns the number of bytes streamed.
pub(crate) fn stream_payload<R: Read + ?Sized>(
    reader: &mut R,
    session: &mut dyn WriteSession,
) -> Result<u64> {
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            return Ok(total);
        }
        let mut written = 0;
        while written < n {
            let accepted = session.write_block(&chunk[written..n])?;
            if accepted == 0 {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "write session accepted no bytes",
                )));
            }
            written += accepted;
        }
        total += n as u64;
    }
}

/// Drains the current entry payload from a read session, discarding it.
pub(crate) fn drain_payload(session: &mut dyn ReadSession) -> Result<u64> {
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = session.read_block(&mut chunk)?;
        if n == 0 {
            return Ok(total);
        }
        total += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_suffix() {
        assert_eq!(archive_suffix(Path::new("a/b.zip")).unwrap(), "zip");
        assert_eq!(archive_suffix(Path::new("b.tar.gz")).unwrap(), "tar.gz");
        assert_eq!(archive_suffix(Path::new("b.TAR.XZ")).unwrap(), "tar.xz");
        assert_eq!(archive_suffix(Path::new("b.tgz")).unwrap(), "tgz");
        assert_eq!(archive_suffix(Path::new("noext")), None);
    }

    #[test]
    fn test_driver_lookup_unsupported() {
        let err = driver_for(Path::new("x.rar")).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedFormat { extension } if extension == "rar"
        ));
    }

    #[test]
    fn test_driver_lookup_known() {
        assert!(driver_for(Path::new("x.zip")).is_ok());
        assert!(driver_for(Path::new("x.jar")).is_ok());
        assert!(driver_for(Path::new("x.tar")).is_ok());
        assert!(driver_for(Path::new("x.tar.gz")).is_ok());
        assert!(driver_for(Path::new("x.cpio")).is_ok());
        #[cfg(feature = "sevenz")]
        assert!(driver_for(Path::new("x.7z")).is_ok());
    }
}
