//! Archive opening, listing, and extraction.
//!
//! [`Archive::open`] builds the entry table once. For zip-family suffixes
//! it tries the central-directory indexer first and falls back to the
//! sequential header walk when the directory is unusable; every other
//! format is listed by streaming headers through its driver. Extraction
//! reuses the table: indexed archives open their read session directly at
//! the entry's local-header offset.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::adapter::SourceReader;
use crate::codec::zip::ZipReadSession;
use crate::codec::{Driver, EntryHeader, EntryKind, ReadSession, archive_suffix, driver_for};
use crate::format::{EntryRecord, index_archive};
use crate::{Error, Result};

/// An archive opened for reading.
///
/// Holds the listing and the driver; each read or extract call opens and
/// closes its own session, so an `Archive` can serve any number of them.
///
/// # Examples
///
/// ```rust,no_run
/// use omniarc::Archive;
///
/// let archive = Archive::open("books.zip")?;
/// for entry in archive.entries() {
///     println!("{} ({} bytes)", entry.path, entry.size);
/// }
/// let data = archive.read("books/first.fb2")?;
/// # Ok::<(), omniarc::Error>(())
/// ```
pub struct Archive {
    path: PathBuf,
    driver: Box<dyn Driver>,
    entries: Vec<EntryRecord>,
    /// Entry offsets came from the central directory and are seekable.
    indexed: bool,
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("path", &self.path)
            .field("entries", &self.entries)
            .field("indexed", &self.indexed)
            .finish_non_exhaustive()
    }
}

impl Archive {
    /// Opens an archive, selecting the driver by filename suffix.
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedFormat`] when no driver covers the suffix,
    /// [`Error::Io`] when the file cannot be read, or a parse error when
    /// neither the indexer nor the streaming walk can list the archive.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let driver = driver_for(&path)?;

        let suffix = archive_suffix(&path).unwrap_or_default();
        if matches!(suffix.as_str(), "zip" | "jar" | "epub") {
            match index_archive(&path) {
                Ok(entries) => {
                    return Ok(Self {
                        path,
                        driver,
                        entries,
                        indexed: true,
                    });
                }
                Err(e) if e.needs_fallback() => {
                    log::debug!(
                        "central directory unusable for {} ({}), using stream listing",
                        path.display(),
                        e
                    );
                }
                Err(e) => return Err(e),
            }
        }

        let entries = stream_entries(driver.as_ref(), &path)?;
        Ok(Self {
            path,
            driver,
            entries,
            indexed: false,
        })
    }

    /// Opens an archive with an explicit driver, bypassing suffix lookup.
    /// This is the hook for container formats the crate does not bundle.
    pub fn open_with_driver(path: impl AsRef<Path>, driver: Box<dyn Driver>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = stream_entries(driver.as_ref(), &path)?;
        Ok(Self {
            path,
            driver,
            entries,
            indexed: false,
        })
    }

    /// The listing, in archive order.
    pub fn entries(&self) -> &[EntryRecord] {
        &self.entries
    }

    /// Path of the archive file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Looks up one listing record by exact path.
    pub fn find(&self, entry_path: &str) -> Option<&EntryRecord> {
        self.entries.iter().find(|e| e.path == entry_path)
    }

    /// Reads one entry's payload into memory.
    ///
    /// Directory entries yield an empty buffer.
    ///
    /// # Errors
    ///
    /// [`Error::EntryNotFound`] when no entry matches, or any decode
    /// failure from the driver (including CRC mismatch for zip).
    pub fn read(&self, entry_path: &str) -> Result<Vec<u8>> {
        let (mut session, header) = self.open_entry(entry_path)?;
        if !matches!(header.kind, EntryKind::File) {
            return Ok(Vec::new());
        }
        let mut out = Vec::with_capacity(header.size.min(64 * 1024 * 1024) as usize);
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = session.read_block(&mut buf)?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    /// Extracts one entry under `dest_dir`, preserving its relative path.
    ///
    /// Directory entries are materialized as directories. When the entry
    /// carries no usable name, a random filename is synthesized in
    /// `dest_dir`, preserving the original extension (a trailing `.tar`
    /// segment is kept for double extensions like `.tar.gz`). Returns the
    /// path written.
    ///
    /// # Errors
    ///
    /// [`Error::PathTraversal`] when the entry path would escape
    /// `dest_dir`; [`Error::EntryNotFound`] when no entry matches.
    pub fn extract(&self, entry_path: &str, dest_dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dest_dir = dest_dir.as_ref();
        let (mut session, header) = self.open_entry(entry_path)?;
        match &header.kind {
            EntryKind::Directory => {
                let target = safe_join(dest_dir, &header.path)?;
                fs::create_dir_all(&target)?;
                Ok(target)
            }
            EntryKind::File => {
                let target = match safe_join(dest_dir, &header.path) {
                    Ok(p) if p != dest_dir => p,
                    Ok(_) => synthesize_name(dest_dir, &header.path)?,
                    Err(e) => return Err(e),
                };
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                write_payload(session.as_mut(), &target)?;
                apply_metadata(&target, &header);
                Ok(target)
            }
            _ => Err(Error::InvalidPath(format!(
                "'{}' is not extractable content",
                header.path
            ))),
        }
    }

    /// Extracts every entry under `dest_dir`. Returns the number of
    /// regular files written.
    ///
    /// Symlinks are recreated on Unix when their target stays relative;
    /// anything else is skipped with a warning. Entry kinds the engine
    /// does not materialize (devices, fifos) are skipped silently.
    pub fn extract_all(&self, dest_dir: impl AsRef<Path>) -> Result<usize> {
        let dest_dir = dest_dir.as_ref();
        fs::create_dir_all(dest_dir)?;
        let mut session = self
            .driver
            .open_read(SourceReader::open_path(&self.path)?)?;

        let mut files = 0;
        while let Some(header) = session.next_entry()? {
            match &header.kind {
                EntryKind::Directory => {
                    fs::create_dir_all(safe_join(dest_dir, &header.path)?)?;
                }
                EntryKind::File => {
                    let target = safe_join(dest_dir, &header.path)?;
                    if let Some(parent) = target.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    write_payload(session.as_mut(), &target)?;
                    apply_metadata(&target, &header);
                    files += 1;
                }
                EntryKind::Symlink { target } => {
                    let link = safe_join(dest_dir, &header.path)?;
                    materialize_symlink(&link, target, &header.path);
                }
                EntryKind::Other => {}
            }
        }
        Ok(files)
    }

    /// Opens a read session positioned at the wanted entry.
    fn open_entry(&self, entry_path: &str) -> Result<(Box<dyn ReadSession>, EntryHeader)> {
        if self.indexed {
            let record = self
                .find(entry_path)
                .ok_or_else(|| Error::EntryNotFound {
                    path: entry_path.into(),
                })?;
            let source = SourceReader::open_path_at(&self.path, record.header_offset)?;
            let mut session: Box<dyn ReadSession> = Box::new(ZipReadSession::with_directory_sizes(
                source,
                record.size,
                record.compressed_size,
            ));
            if let Some(header) = session.next_entry()? {
                if header.path == record.path {
                    return Ok((session, header));
                }
                log::debug!(
                    "local header at {:#x} names '{}', expected '{}'; scanning instead",
                    record.header_offset,
                    header.path,
                    record.path
                );
            }
        }

        let mut session = self
            .driver
            .open_read(SourceReader::open_path(&self.path)?)?;
        while let Some(header) = session.next_entry()? {
            if header.path == entry_path {
                return Ok((session, header));
            }
        }
        Err(Error::EntryNotFound {
            path: entry_path.into(),
        })
    }
}

/// Lists an archive by walking headers through its driver.
fn stream_entries(driver: &dyn Driver, path: &Path) -> Result<Vec<EntryRecord>> {
    let mut session = driver.open_read(SourceReader::open_path(path)?)?;
    let mut entries = Vec::new();
    while let Some(header) = session.next_entry()? {
        entries.push(EntryRecord {
            path: header.path,
            size: header.size,
            compressed_size: header.compressed_size,
            header_offset: header.header_offset,
        });
    }
    Ok(entries)
}

/// Joins an archive-relative path onto `base`, rejecting anything that
/// would land outside it.
fn safe_join(base: &Path, entry_path: &str) -> Result<PathBuf> {
    if entry_path.starts_with('/') {
        return Err(Error::PathTraversal {
            path: entry_path.into(),
        });
    }
    let mut out = base.to_path_buf();
    for component in entry_path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                return Err(Error::PathTraversal {
                    path: entry_path.into(),
                });
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Streams the current entry payload to a new file at `target`.
fn write_payload(session: &mut dyn ReadSession, target: &Path) -> Result<()> {
    let mut file = File::create(target)?;
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = session.read_block(&mut buf)?;
        if n == 0 {
            return Ok(file.flush()?);
        }
        file.write_all(&buf[..n])?;
    }
}

/// Best-effort metadata application; failures are logged, not fatal.
fn apply_metadata(target: &Path, header: &EntryHeader) {
    if let Some(mtime) = header.mtime {
        let ft = filetime::FileTime::from_unix_time(mtime, 0);
        if let Err(e) = filetime::set_file_mtime(target, ft) {
            log::warn!("failed to set mtime on {}: {}", target.display(), e);
        }
    }
    #[cfg(unix)]
    if let Some(mode) = header.mode {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(target, fs::Permissions::from_mode(mode)) {
            log::warn!("failed to set permissions on {}: {}", target.display(), e);
        }
    }
}

/// Recreates a symlink when safe; otherwise skips with a warning.
fn materialize_symlink(link: &Path, target: &str, entry_path: &str) {
    if target.is_empty() || target.starts_with('/') || target.split('/').any(|c| c == "..") {
        log::warn!("skipping symlink '{}': unsafe target '{}'", entry_path, target);
        return;
    }
    #[cfg(unix)]
    {
        if let Some(parent) = link.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Err(e) = std::os::unix::fs::symlink(target, link) {
            log::warn!("failed to create symlink '{}': {}", entry_path, e);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = link;
        log::warn!("skipping symlink '{}': unsupported on this platform", entry_path);
    }
}

/// Picks a random destination filename preserving the entry's extension,
/// with `.tar` double extensions kept intact.
fn synthesize_name(dir: &Path, original: &str) -> Result<PathBuf> {
    let suffix = extension_suffix(original);
    let file = tempfile::Builder::new()
        .prefix("entry-")
        .suffix(&suffix)
        .tempfile_in(dir)?;
    let (_, path) = file.keep().map_err(|e| Error::Io(e.error))?;
    Ok(path)
}

/// Returns the dot-prefixed extension of `name`, or an empty string.
fn extension_suffix(name: &str) -> String {
    let base = name.rsplit('/').next().unwrap_or(name);
    let Some((stem, ext)) = base.rsplit_once('.') else {
        return String::new();
    };
    if ext.is_empty() || stem.is_empty() {
        return String::new();
    }
    if stem.to_lowercase().ends_with(".tar") {
        format!(".tar.{}", ext)
    } else {
        format!(".{}", ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_join_rejects_traversal() {
        let base = Path::new("/tmp/out");
        assert!(safe_join(base, "../escape").is_err());
        assert!(safe_join(base, "a/../../escape").is_err());
        assert!(safe_join(base, "/absolute").is_err());
        assert_eq!(
            safe_join(base, "a/./b.txt").unwrap(),
            Path::new("/tmp/out/a/b.txt")
        );
    }

    #[test]
    fn test_extension_suffix() {
        assert_eq!(extension_suffix("book.fb2"), ".fb2");
        assert_eq!(extension_suffix("data.tar.gz"), ".tar.gz");
        assert_eq!(extension_suffix("dir/archive.TAR.xz"), ".tar.xz");
        assert_eq!(extension_suffix("noext"), "");
        assert_eq!(extension_suffix(".hidden"), "");
    }
}
