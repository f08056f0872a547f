//! Archive construction from files and directory trees.

use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::adapter::SourceWriter;
use crate::archive_path::ArchivePath;
use crate::codec::{EntryHeader, EntryKind, WriteSession, driver_for, stream_payload};
use crate::timestamp::unix_from_system;
use crate::{Error, Result};

/// Options for [`pack`].
#[derive(Debug, Clone, Default)]
pub struct PackOptions {
    /// Replaces the source's own name as the top-level path component of
    /// every entry. Used when a file must appear inside the archive under
    /// a caller-chosen name distinct from its on-disk name.
    pub rename_root: Option<String>,
}

/// Packs a file or directory tree into a new archive at `destination`.
///
/// The container format is selected by the destination's suffix. For a
/// directory source the whole subtree is enumerated with entry paths
/// relative to the source's parent; symlinks are resolved before packing,
/// so a link to a file is stored as that file's content under the link's
/// path and a link to a directory is expanded in place. When two link
/// chains reach the same real path, only the first occurrence is kept.
///
/// Only regular files become entries; directories exist implicitly
/// through their children's paths.
///
/// Returns the number of bytes written to the archive.
///
/// # Examples
///
/// ```rust,no_run
/// use omniarc::{PackOptions, pack};
///
/// let written = pack("books/", "books.zip", &PackOptions::default())?;
/// println!("wrote {} bytes", written);
/// # Ok::<(), omniarc::Error>(())
/// ```
///
/// # Errors
///
/// [`Error::UnsupportedFormat`] for an unknown destination suffix,
/// [`Error::InvalidPath`] when an entry's archive-relative path cannot be
/// represented, or [`Error::Io`] from the filesystem walk or the write.
pub fn pack(
    source: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    options: &PackOptions,
) -> Result<u64> {
    let source = source.as_ref();
    let destination = destination.as_ref();
    let driver = driver_for(destination)?;

    let inputs = collect_inputs(source)?;
    let mut session = driver.open_write(SourceWriter::create_path(destination)?)?;
    for (real_path, archive_path) in inputs {
        let archive_path = match &options.rename_root {
            Some(new_root) => archive_path.with_root_component(new_root)?,
            None => archive_path,
        };
        write_file_entry(session.as_mut(), &real_path, &archive_path)?;
    }
    session.finish()
}

/// Enumerates `(real path, archive path)` pairs for the source, symlinks
/// resolved and deduplicated.
fn collect_inputs(source: &Path) -> Result<Vec<(PathBuf, ArchivePath)>> {
    let metadata = std::fs::metadata(source)?;
    if metadata.is_file() {
        let name = source
            .file_name()
            .ok_or_else(|| Error::InvalidPath(source.display().to_string()))?
            .to_string_lossy()
            .into_owned();
        return Ok(vec![(source.to_path_buf(), ArchivePath::new(&name)?)]);
    }

    // Archive paths are computed relative to the source's parent, so the
    // tree's own directory name is the entries' top-level component.
    let base = source.parent().unwrap_or_else(|| Path::new(""));
    let mut seen = HashSet::new();
    let mut inputs = Vec::new();
    for entry in WalkDir::new(source).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        // Expanded directory links may reach the same real file twice;
        // keep the first occurrence. A file that is itself a symlink is
        // always packed, as its own archive path with its target's bytes.
        if !entry.path_is_symlink() {
            let real = std::fs::canonicalize(entry.path())?;
            if !seen.insert(real) {
                continue;
            }
        }
        let relative = entry
            .path()
            .strip_prefix(base)
            .map_err(|_| Error::InvalidPath(entry.path().display().to_string()))?;
        let joined = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        inputs.push((entry.path().to_path_buf(), ArchivePath::new(&joined)?));
    }
    Ok(inputs)
}

/// Writes one file entry: metadata first, then the payload in chunks.
fn write_file_entry(
    session: &mut dyn WriteSession,
    real_path: &Path,
    archive_path: &ArchivePath,
) -> Result<()> {
    let metadata = std::fs::metadata(real_path)?;
    let mut header = EntryHeader {
        path: archive_path.as_str().to_string(),
        size: metadata.len(),
        compressed_size: metadata.len(),
        header_offset: 0,
        kind: EntryKind::File,
        mode: None,
        mtime: metadata.modified().ok().map(unix_from_system),
    };
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        header.mode = Some(metadata.permissions().mode() & 0o7777);
    }

    session.write_entry(&header)?;
    let mut file = File::open(real_path)?;
    let streamed = stream_payload(&mut file, session)?;
    if streamed != header.size {
        return Err(Error::Codec(format!(
            "'{}' changed size during packing ({} declared, {} streamed)",
            archive_path,
            header.size,
            streamed
        )));
    }
    Ok(())
}
