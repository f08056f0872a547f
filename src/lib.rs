//! # omniarc
//!
//! A uniform access and mutation layer for heterogeneous archive
//! containers.
//!
//! This crate lists, extracts, creates, and surgically edits entries in
//! zip, jar, tar (plain, gz, bz2, xz), cpio, and (read-only) 7z archives
//! behind one API.
//! Zip listings take a fast path through a hand-rolled central-directory
//! indexer (including the Zip64 extension) that never spins up the full
//! decode machinery; everything else, and every damaged zip, streams
//! headers through a pull-based codec boundary that container backends
//! plug into.
//!
//! ## Quick Start
//!
//! ### Listing and Extracting
//!
//! ```rust,no_run
//! use omniarc::{Archive, Result};
//!
//! fn main() -> Result<()> {
//!     let archive = Archive::open("books.zip")?;
//!
//!     for entry in archive.entries() {
//!         println!("{}: {} bytes", entry.path, entry.size);
//!     }
//!
//!     // Single entry into memory, straight from its local-header offset.
//!     let data = archive.read("books/0042.fb2")?;
//!     println!("read {} bytes", data.len());
//!
//!     // Everything onto disk.
//!     archive.extract_all("./output")?;
//!     Ok(())
//! }
//! ```
//!
//! ### Creating an Archive
//!
//! ```rust,no_run
//! use omniarc::{PackOptions, Result, pack};
//!
//! fn main() -> Result<()> {
//!     // Suffix selects the container: .zip, .tar, .tar.gz, .cpio, ...
//!     let written = pack("books/", "books.tar.gz", &PackOptions::default())?;
//!     println!("wrote {} bytes", written);
//!     Ok(())
//! }
//! ```
//!
//! ### Editing an Existing Archive
//!
//! Containers have no in-place mutation, so edits rewrite the archive
//! into a temporary file next to the original and atomically swap it in.
//! A failed edit leaves the original byte-for-byte unchanged.
//!
//! ```rust,no_run
//! use omniarc::{ArchiveEditor, ArchivePath, Result};
//!
//! fn main() -> Result<()> {
//!     let result = ArchiveEditor::new("books.zip")
//!         .remove("books/withdrawn.fb2")
//!         .add_file(ArchivePath::new("books/new.fb2")?, "incoming/new.fb2")
//!         .commit()?;
//!     println!(
//!         "copied {}, removed {}, added {}",
//!         result.copied, result.removed, result.added
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `bzip2` | Yes | `.tar.bz2` support via the `bzip2` crate |
//! | `xz` | Yes | `.tar.xz` support via the `xz2` crate |
//! | `sevenz` | Yes | Read-only `.7z` support via the `sevenz-rust` crate |
//!
//! ## Safety
//!
//! - **Path traversal protection**: entry paths are validated before any
//!   extraction writes; `..` components and absolute paths are rejected.
//! - **CRC verification**: zip payloads are checked against the recorded
//!   CRC-32 during extraction.
//! - **Commit-or-rollback edits**: surgery never writes to the original
//!   archive; the replacement appears in a single rename.
//!
//! ## Concurrency
//!
//! Every operation is synchronous and owns its file handles for the
//! duration of the call. Calls on different archive files are independent;
//! callers are responsible for serializing access to one archive path.
//!
//! ## Minimum Supported Rust Version (MSRV)
//!
//! This crate requires **Rust 1.85** or later.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod adapter;
pub mod archive_path;
pub mod codec;
pub mod edit;
pub mod error;
pub mod format;
pub mod read;
pub mod source;
pub mod timestamp;
pub mod write;

pub use adapter::{SourceReader, SourceWriter};
pub use archive_path::ArchivePath;
pub use codec::{Driver, EntryHeader, EntryKind, ReadSession, WriteSession};
pub use edit::{ArchiveEditor, EditPolicy, EditResult};
pub use error::{Error, Result};
pub use format::EntryRecord;
pub use read::Archive;
pub use source::{ArchiveIoSource, BufferedFile};
pub use write::{PackOptions, pack};
