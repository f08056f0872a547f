//! Archive surgery: removing and adding entries by whole-archive rewrite.
//!
//! The codec boundary exposes no in-place mutation, so edits stream every
//! surviving entry from the source into a temporary archive in the same
//! directory and atomically swap it over the original. Any failure drops
//! the temporary file and leaves the original byte-for-byte unchanged.

use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::adapter::{SourceReader, SourceWriter};
use crate::archive_path::ArchivePath;
use crate::codec::{
    CHUNK_SIZE, EntryHeader, EntryKind, ReadSession, WriteSession, archive_suffix, driver_for,
};
use crate::read::Archive;
use crate::timestamp::unix_from_system;
use crate::{Error, Result};

/// Which archives surgery refuses to touch.
///
/// Collection index archives are rebuilt by their own tooling; rewriting
/// one here would desynchronize it from the collection it describes. The
/// check is by filename suffix and runs before any file is opened.
#[derive(Debug, Clone)]
pub struct EditPolicy {
    reserved_suffixes: Vec<String>,
}

impl Default for EditPolicy {
    fn default() -> Self {
        Self {
            reserved_suffixes: vec!["inpx".into()],
        }
    }
}

impl EditPolicy {
    /// A policy with no reserved suffixes.
    pub fn permissive() -> Self {
        Self {
            reserved_suffixes: Vec::new(),
        }
    }

    /// Adds a reserved suffix (without the leading dot).
    pub fn reserve(mut self, suffix: impl Into<String>) -> Self {
        self.reserved_suffixes.push(suffix.into().to_lowercase());
        self
    }

    fn check(&self, path: &Path) -> Result<()> {
        let suffix = archive_suffix(path).unwrap_or_default();
        if self.reserved_suffixes.iter().any(|r| *r == suffix) {
            return Err(Error::PolicyRejected {
                path: path.display().to_string(),
            });
        }
        Ok(())
    }
}

/// Counters describing what a committed edit did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditResult {
    /// Entries copied through unchanged.
    pub copied: usize,
    /// Entries dropped by removal requests.
    pub removed: usize,
    /// New entries appended.
    pub added: usize,
    /// Size of the replacement archive in bytes.
    pub bytes_written: u64,
}

/// A queued rewrite of one archive.
///
/// Removals and additions accumulate until [`commit`](ArchiveEditor::commit)
/// performs the whole rewrite in one pass. Dropping an editor without
/// committing does nothing.
///
/// # Examples
///
/// ```rust,no_run
/// use omniarc::{ArchiveEditor, ArchivePath};
///
/// let result = ArchiveEditor::new("books.zip")
///     .remove("books/stale.fb2")
///     .add_file(ArchivePath::new("books/fresh.fb2")?, "incoming/fresh.fb2")
///     .commit()?;
/// println!("copied {}, removed {}", result.copied, result.removed);
/// # Ok::<(), omniarc::Error>(())
/// ```
pub struct ArchiveEditor {
    path: PathBuf,
    policy: EditPolicy,
    removals: Vec<String>,
    additions: Vec<(ArchivePath, PathBuf)>,
}

impl ArchiveEditor {
    /// Creates an editor for the archive at `path` with the default
    /// policy.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_policy(path, EditPolicy::default())
    }

    /// Creates an editor with an explicit policy.
    pub fn with_policy(path: impl AsRef<Path>, policy: EditPolicy) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            policy,
            removals: Vec::new(),
            additions: Vec::new(),
        }
    }

    /// Queues removal of one entry. Removing a path that is absent is not
    /// an error; the commit counters report what actually happened.
    pub fn remove(mut self, entry_path: impl Into<String>) -> Self {
        self.removals.push(entry_path.into());
        self
    }

    /// Queues addition of a disk file under `archive_path`.
    pub fn add_file(mut self, archive_path: ArchivePath, source: impl AsRef<Path>) -> Self {
        self.additions
            .push((archive_path, source.as_ref().to_path_buf()));
        self
    }

    /// Performs the rewrite.
    ///
    /// # Errors
    ///
    /// - [`Error::PolicyRejected`] before any I/O for reserved suffixes.
    /// - [`Error::EntryExists`] when an addition collides with a
    ///   surviving entry.
    /// - [`Error::RewriteRead`] / [`Error::RewriteWrite`] when the copy
    ///   loop fails; the original archive is untouched and the temporary
    ///   file is gone.
    pub fn commit(self) -> Result<EditResult> {
        self.policy.check(&self.path)?;
        let driver = driver_for(&self.path)?;

        let removals: HashSet<String> = self.removals.iter().cloned().collect();
        let listing = Archive::open(&self.path)?;
        for (archive_path, _) in &self.additions {
            let collides = listing
                .entries()
                .iter()
                .any(|e| e.path == archive_path.as_str() && !removals.contains(&e.path));
            if collides {
                return Err(Error::EntryExists {
                    path: archive_path.as_str().to_string(),
                });
            }
        }

        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        // Same directory as the source, so the final rename never crosses
        // a filesystem boundary.
        let temp = tempfile::Builder::new()
            .prefix(".rewrite-")
            .suffix(".tmp")
            .tempfile_in(parent)?;

        let reader = driver.open_read(SourceReader::open_path(&self.path)?)?;
        let temp_handle = temp.reopen()?;
        let writer = driver.open_write(SourceWriter::from_file(temp.path(), temp_handle))?;

        // Any error below drops `temp`, which deletes the partial file.
        let result = rewrite(reader, writer, &removals, &self.additions)?;

        temp.persist(&self.path).map_err(|e| Error::RewriteWrite {
            source: Box::new(Error::Io(e.error)),
        })?;
        Ok(result)
    }
}

fn read_side(e: Error) -> Error {
    Error::RewriteRead {
        source: Box::new(e),
    }
}

fn write_side(e: Error) -> Error {
    Error::RewriteWrite {
        source: Box::new(e),
    }
}

/// True when `path` matches a removal request, with or without the
/// directory trailing slash.
fn is_removed(removals: &HashSet<String>, path: &str) -> bool {
    removals.contains(path) || removals.contains(path.trim_end_matches('/'))
}

/// The copy loop: streams surviving entries, then appends additions.
///
/// Split out from [`ArchiveEditor::commit`] so failure injection can drive
/// it against arbitrary sessions.
pub(crate) fn rewrite(
    mut reader: Box<dyn ReadSession>,
    mut writer: Box<dyn WriteSession>,
    removals: &HashSet<String>,
    additions: &[(ArchivePath, PathBuf)],
) -> Result<EditResult> {
    let mut result = EditResult::default();
    let mut chunk = vec![0u8; CHUNK_SIZE];

    while let Some(header) = reader.next_entry().map_err(read_side)? {
        if is_removed(removals, &header.path) {
            result.removed += 1;
            continue;
        }
        if matches!(header.kind, EntryKind::Other) {
            log::warn!("dropping non-materializable entry '{}'", header.path);
            continue;
        }
        writer.write_entry(&header).map_err(write_side)?;
        if matches!(header.kind, EntryKind::File) {
            loop {
                let n = reader.read_block(&mut chunk).map_err(read_side)?;
                if n == 0 {
                    break;
                }
                let mut written = 0;
                while written < n {
                    written += writer
                        .write_block(&chunk[written..n])
                        .map_err(write_side)?;
                }
            }
        }
        result.copied += 1;
    }

    for (archive_path, source) in additions {
        let metadata = std::fs::metadata(source).map_err(|e| read_side(Error::Io(e)))?;
        let mut header = EntryHeader::file(archive_path.as_str(), metadata.len());
        header.mtime = metadata.modified().ok().map(unix_from_system);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            header.mode = Some(metadata.permissions().mode() & 0o7777);
        }
        writer.write_entry(&header).map_err(write_side)?;

        let mut file = File::open(source).map_err(|e| read_side(Error::Io(e)))?;
        loop {
            let n = std::io::Read::read(&mut file, &mut chunk)
                .map_err(|e| read_side(Error::Io(e)))?;
            if n == 0 {
                break;
            }
            let mut written = 0;
            while written < n {
                written += writer
                    .write_block(&chunk[written..n])
                    .map_err(write_side)?;
            }
        }
        result.added += 1;
    }

    result.bytes_written = writer.finish().map_err(write_side)?;
    Ok(result)
}
