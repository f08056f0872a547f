//! Archive surgery against real files: rewrite, rollback, policy.

mod common;

use common::build_tree;
use omniarc::{Archive, ArchiveEditor, ArchivePath, EditPolicy, Error, PackOptions, pack};
use tempfile::TempDir;

fn fixture_archive(dir: &TempDir, name: &str) -> std::path::PathBuf {
    let source = dir.path().join("tree");
    build_tree(
        &source,
        &[
            ("root/keep.txt", b"keep me"),
            ("root/drop.txt", b"drop me"),
            ("root/other.bin", &[3u8; 900]),
        ],
    );
    let archive_path = dir.path().join(name);
    pack(source.join("root"), &archive_path, &PackOptions::default()).unwrap();
    archive_path
}

fn temp_leftovers(dir: &TempDir) -> Vec<String> {
    std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with(".rewrite-"))
        .collect()
}

#[test]
fn test_remove_entry() {
    let dir = TempDir::new().unwrap();
    let path = fixture_archive(&dir, "edit.zip");

    let result = ArchiveEditor::new(&path)
        .remove("root/drop.txt")
        .commit()
        .unwrap();
    assert_eq!(result.removed, 1);
    assert_eq!(result.copied, 2);
    assert_eq!(result.added, 0);
    assert!(result.bytes_written > 0);

    let archive = Archive::open(&path).unwrap();
    assert!(archive.find("root/drop.txt").is_none());
    assert_eq!(archive.read("root/keep.txt").unwrap(), b"keep me");
    assert_eq!(archive.read("root/other.bin").unwrap(), vec![3u8; 900]);
}

#[test]
fn test_add_entry() {
    let dir = TempDir::new().unwrap();
    let path = fixture_archive(&dir, "add.zip");
    let incoming = dir.path().join("incoming.txt");
    std::fs::write(&incoming, b"fresh content").unwrap();

    let result = ArchiveEditor::new(&path)
        .add_file(ArchivePath::new("root/fresh.txt").unwrap(), &incoming)
        .commit()
        .unwrap();
    assert_eq!(result.added, 1);
    assert_eq!(result.copied, 3);

    let archive = Archive::open(&path).unwrap();
    assert_eq!(archive.read("root/fresh.txt").unwrap(), b"fresh content");
    // Surviving entries kept their original relative order, additions
    // appended at the end.
    assert_eq!(archive.entries().last().unwrap().path, "root/fresh.txt");
}

#[test]
fn test_replace_entry_in_one_commit() {
    let dir = TempDir::new().unwrap();
    let path = fixture_archive(&dir, "replace.zip");
    let incoming = dir.path().join("v2.txt");
    std::fs::write(&incoming, b"version two").unwrap();

    ArchiveEditor::new(&path)
        .remove("root/keep.txt")
        .add_file(ArchivePath::new("root/keep.txt").unwrap(), &incoming)
        .commit()
        .unwrap();

    let archive = Archive::open(&path).unwrap();
    assert_eq!(archive.read("root/keep.txt").unwrap(), b"version two");
    assert_eq!(archive.entries().len(), 3);
}

#[test]
fn test_addition_collision_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = fixture_archive(&dir, "collide.zip");
    let incoming = dir.path().join("dup.txt");
    std::fs::write(&incoming, b"dup").unwrap();

    let before = std::fs::read(&path).unwrap();
    let err = ArchiveEditor::new(&path)
        .add_file(ArchivePath::new("root/keep.txt").unwrap(), &incoming)
        .commit()
        .unwrap_err();
    assert!(matches!(err, Error::EntryExists { .. }));
    assert_eq!(std::fs::read(&path).unwrap(), before);
}

#[test]
fn test_failed_edit_rolls_back() {
    let dir = TempDir::new().unwrap();
    let path = fixture_archive(&dir, "rollback.zip");
    let before = std::fs::read(&path).unwrap();

    // Addition source vanishes before the rewrite reads it.
    let err = ArchiveEditor::new(&path)
        .add_file(
            ArchivePath::new("root/ghost.txt").unwrap(),
            dir.path().join("does-not-exist.txt"),
        )
        .commit()
        .unwrap_err();
    assert!(matches!(err, Error::RewriteRead { .. }));

    // Original archive byte-for-byte unchanged, no temporary left behind.
    assert_eq!(std::fs::read(&path).unwrap(), before);
    assert!(temp_leftovers(&dir).is_empty());
}

#[test]
fn test_edit_works_on_tar() {
    let dir = TempDir::new().unwrap();
    let path = fixture_archive(&dir, "edit.tar.gz");

    let result = ArchiveEditor::new(&path)
        .remove("root/drop.txt")
        .commit()
        .unwrap();
    assert_eq!(result.removed, 1);

    let archive = Archive::open(&path).unwrap();
    assert_eq!(archive.entries().len(), 2);
    assert_eq!(archive.read("root/keep.txt").unwrap(), b"keep me");
}

#[test]
fn test_removing_absent_entry_is_counted_not_fatal() {
    let dir = TempDir::new().unwrap();
    let path = fixture_archive(&dir, "absent.zip");

    let result = ArchiveEditor::new(&path)
        .remove("root/never-was.txt")
        .commit()
        .unwrap();
    assert_eq!(result.removed, 0);
    assert_eq!(result.copied, 3);
}

#[test]
fn test_policy_rejection_happens_before_io() {
    // The path does not even exist; the policy check still fires first.
    let err = ArchiveEditor::new("/nonexistent/collection.inpx")
        .remove("x")
        .commit()
        .unwrap_err();
    assert!(matches!(err, Error::PolicyRejected { .. }));
}

#[test]
fn test_permissive_policy_defers_to_driver_lookup() {
    // With no reserved suffixes the edit is no longer policy-rejected;
    // it fails later because nothing drives the .inpx container.
    let err = ArchiveEditor::with_policy("collection.inpx", EditPolicy::permissive())
        .remove("x")
        .commit()
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedFormat { .. }));
}
