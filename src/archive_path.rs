//! Archive path type with validation and separator normalization.

use crate::{Error, Result};
use std::fmt;

/// Maximum length for archive paths (in bytes).
///
/// This limit guards against malicious archives carrying absurdly long
/// names. 32KB is well above any real file system path limit.
const MAX_PATH_LENGTH: usize = 32768;

/// A validated, forward-slash normalized archive-relative path.
///
/// `ArchivePath` is the path form every layer above the codec boundary
/// sees: POSIX-style separators regardless of how the path was stored in
/// the archive. Validation ensures:
/// - No NUL bytes are present
/// - The path is not absolute (does not start with `/`)
/// - No empty segments exist (no `//` or trailing `/`)
/// - No `.` or `..` segments are present (prevents path traversal)
///
/// # Examples
///
/// ```
/// use omniarc::ArchivePath;
///
/// let path = ArchivePath::new("dir/file.txt").unwrap();
/// assert_eq!(path.as_str(), "dir/file.txt");
///
/// // Backslash-separated resident forms are normalized
/// let path = ArchivePath::new(r"dir\file.txt").unwrap();
/// assert_eq!(path.as_str(), "dir/file.txt");
///
/// // Traversal is rejected
/// assert!(ArchivePath::new("../secret").is_err());
/// assert!(ArchivePath::new("/absolute/path").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchivePath(String);

impl ArchivePath {
    /// Creates a new `ArchivePath`, normalizing separators and validating.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] if the path is empty, absolute,
    /// contains NUL bytes, empty segments, or `.`/`..` segments.
    pub fn new(s: &str) -> Result<Self> {
        let normalized = if s.contains('\\') {
            s.replace('\\', "/")
        } else {
            s.to_string()
        };
        Self::validate(&normalized)?;
        Ok(Self(normalized))
    }

    fn validate(s: &str) -> Result<()> {
        if s.is_empty() {
            return Err(Error::InvalidPath("empty path".into()));
        }
        if s.contains('\0') {
            return Err(Error::InvalidPath("contains NUL byte".into()));
        }
        if s.len() > MAX_PATH_LENGTH {
            return Err(Error::InvalidPath(format!(
                "path exceeds maximum length of {} bytes",
                MAX_PATH_LENGTH
            )));
        }
        if s.starts_with('/') {
            return Err(Error::InvalidPath("absolute path not allowed".into()));
        }
        if s.ends_with('/') {
            return Err(Error::InvalidPath("trailing slash not allowed".into()));
        }
        for segment in s.split('/') {
            if segment.is_empty() {
                return Err(Error::InvalidPath(
                    "empty segment (consecutive slashes)".into(),
                ));
            }
            if segment == "." {
                return Err(Error::InvalidPath("'.' segment not allowed".into()));
            }
            if segment == ".." {
                return Err(Error::InvalidPath(
                    "'..' segment not allowed (path traversal)".into(),
                ));
            }
        }
        Ok(())
    }

    /// Returns the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the final path component.
    pub fn file_name(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    /// Returns the extension of the final component, without the dot.
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(&name[idx + 1..]),
        }
    }

    /// Returns true if the first path component equals `prefix`.
    pub fn has_root_component(&self, prefix: &str) -> bool {
        match self.0.split_once('/') {
            Some((first, _)) => first == prefix,
            None => self.0 == prefix,
        }
    }

    /// Replaces the first path component with `new_root`.
    ///
    /// Used by packing's rename-root option: a file added from disk can
    /// appear inside the archive under a caller-chosen top-level name.
    pub fn with_root_component(&self, new_root: &str) -> Result<Self> {
        match self.0.split_once('/') {
            Some((_, rest)) => Self::new(&format!("{}/{}", new_root, rest)),
            None => Self::new(new_root),
        }
    }
}

impl fmt::Display for ArchivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ArchivePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
