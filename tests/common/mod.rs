//! Shared helpers for integration tests.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Writes a fixture tree of `(relative path, content)` files under `base`.
pub fn build_tree(base: &Path, files: &[(&str, &[u8])]) {
    for (rel, data) in files {
        let path = base.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, data).unwrap();
    }
}

/// Reads every regular file under `base` into a `relative path -> bytes`
/// map with forward-slash separators.
#[allow(dead_code)]
pub fn read_tree(base: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut out = BTreeMap::new();
    for entry in walkdir::WalkDir::new(base) {
        let entry = entry.unwrap();
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(base)
            .unwrap()
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        out.insert(rel, fs::read(entry.path()).unwrap());
    }
    out
}

/// Finds the byte offset of the last EOCD signature in a zip file.
#[allow(dead_code)]
pub fn eocd_offset(bytes: &[u8]) -> usize {
    bytes
        .windows(4)
        .rposition(|w| w == [0x50, 0x4b, 0x05, 0x06])
        .expect("no EOCD signature in fixture")
}
