//! Pack/extract round-trips across the bundled container formats.

mod common;

use common::{build_tree, read_tree};
use omniarc::{Archive, PackOptions, pack};
use tempfile::TempDir;

const FIXTURE: &[(&str, &[u8])] = &[
    ("root/a.txt", b"alpha"),
    ("root/sub/b.txt", b"beta content"),
    ("root/sub/deep/c.bin", &[0xAB; 2000]),
];

fn roundtrip(archive_name: &str) {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("tree");
    build_tree(&source, FIXTURE);

    let archive_path = dir.path().join(archive_name);
    pack(source.join("root"), &archive_path, &PackOptions::default()).unwrap();

    let out = dir.path().join("out");
    let archive = Archive::open(&archive_path).unwrap();
    let files = archive.extract_all(&out).unwrap();
    assert_eq!(files, FIXTURE.len());

    let expected = read_tree(&source);
    let actual = read_tree(&out);
    assert_eq!(expected, actual);
}

#[test]
fn test_zip_roundtrip() {
    roundtrip("tree.zip");
}

#[test]
fn test_tar_roundtrip() {
    roundtrip("tree.tar");
}

#[test]
fn test_tar_gz_roundtrip() {
    roundtrip("tree.tar.gz");
}

#[cfg(feature = "bzip2")]
#[test]
fn test_tar_bz2_roundtrip() {
    roundtrip("tree.tar.bz2");
}

#[cfg(feature = "xz")]
#[test]
fn test_tar_xz_roundtrip() {
    roundtrip("tree.tar.xz");
}

#[test]
fn test_cpio_roundtrip() {
    roundtrip("tree.cpio");
}

#[cfg(feature = "sevenz")]
#[test]
fn test_sevenz_reads_and_extracts() {
    // 7z is read-only, so the fixture is produced by the backend crate's
    // own compressor rather than pack().
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("tree");
    build_tree(
        &source,
        &[("a.txt", b"alpha"), ("sub/b.txt", b"beta content")],
    );
    let archive_path = dir.path().join("tree.7z");
    sevenz_rust::compress_to_path(&source, &archive_path).unwrap();

    let archive = Archive::open(&archive_path).unwrap();
    assert_eq!(archive.read("a.txt").unwrap(), b"alpha");

    let out = dir.path().join("out");
    archive.extract_all(&out).unwrap();
    assert_eq!(
        std::fs::read(out.join("sub/b.txt")).unwrap(),
        b"beta content"
    );
}

#[cfg(feature = "sevenz")]
#[test]
fn test_sevenz_pack_is_refused() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("tree");
    build_tree(&source, &[("a.txt", b"alpha")]);

    let err = pack(
        &source,
        dir.path().join("tree.7z"),
        &PackOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, omniarc::Error::Codec(_)));
}

#[test]
fn test_jar_suffix_uses_zip_driver() {
    roundtrip("tree.jar");
}

#[cfg(unix)]
#[test]
fn test_file_symlink_packs_as_content() {
    // root/a.txt (3 bytes) plus root/b.txt -> a.txt must produce exactly
    // two entries with identical 3-byte content.
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("root");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join("a.txt"), b"xyz").unwrap();
    std::os::unix::fs::symlink("a.txt", root.join("b.txt")).unwrap();

    let archive_path = dir.path().join("links.zip");
    pack(&root, &archive_path, &PackOptions::default()).unwrap();

    let archive = Archive::open(&archive_path).unwrap();
    let mut paths: Vec<_> = archive.entries().iter().map(|e| e.path.clone()).collect();
    paths.sort();
    assert_eq!(paths, ["root/a.txt", "root/b.txt"]);
    assert_eq!(archive.read("root/a.txt").unwrap(), b"xyz");
    assert_eq!(archive.read("root/b.txt").unwrap(), b"xyz");
    assert_eq!(archive.find("root/b.txt").unwrap().size, 3);
}

#[cfg(unix)]
#[test]
fn test_directory_symlink_expands_once() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("root");
    std::fs::create_dir_all(root.join("docs")).unwrap();
    std::fs::write(root.join("docs/x.txt"), b"shared").unwrap();
    std::os::unix::fs::symlink("docs", root.join("mirror")).unwrap();

    let archive_path = dir.path().join("mirror.tar");
    pack(&root, &archive_path, &PackOptions::default()).unwrap();

    let archive = Archive::open(&archive_path).unwrap();
    // The same real file reached through two chains is kept once.
    assert_eq!(archive.entries().len(), 1);
}

#[test]
fn test_rename_root_across_formats() {
    for name in ["renamed.zip", "renamed.tar"] {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("tree");
        build_tree(&source, FIXTURE);

        let archive_path = dir.path().join(name);
        let options = PackOptions {
            rename_root: Some("shelf".into()),
        };
        pack(source.join("root"), &archive_path, &options).unwrap();

        let archive = Archive::open(&archive_path).unwrap();
        for entry in archive.entries() {
            assert!(
                entry.path.starts_with("shelf/"),
                "unexpected path {}",
                entry.path
            );
        }
    }
}

#[test]
fn test_single_entry_extraction() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("tree");
    build_tree(&source, FIXTURE);

    let archive_path = dir.path().join("pick.zip");
    pack(source.join("root"), &archive_path, &PackOptions::default()).unwrap();

    let out = dir.path().join("out");
    std::fs::create_dir_all(&out).unwrap();
    let archive = Archive::open(&archive_path).unwrap();
    let written = archive.extract("root/sub/b.txt", &out).unwrap();
    assert_eq!(std::fs::read(&written).unwrap(), b"beta content");
    assert!(written.ends_with("root/sub/b.txt"));
}

#[test]
fn test_unsupported_suffix_is_rejected() {
    let err = Archive::open("something.rar").unwrap_err();
    assert!(matches!(
        err,
        omniarc::Error::UnsupportedFormat { extension } if extension == "rar"
    ));
}

#[test]
fn test_in_memory_read_matches_extraction() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("tree");
    build_tree(&source, FIXTURE);

    let archive_path = dir.path().join("mem.tar.gz");
    pack(source.join("root"), &archive_path, &PackOptions::default()).unwrap();

    let archive = Archive::open(&archive_path).unwrap();
    assert_eq!(archive.read("root/sub/deep/c.bin").unwrap(), vec![0xAB; 2000]);
}
