// Copyright Staunch Contributors.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Downloading and caching target files, including consistent-snapshot naming.

mod test_utils;

use ring::digest::{digest, SHA256};
use staunch::Error;
use test_utils::*;

const CONTENT: &[u8] = b"Contents of file1 for testing.\n";

#[test]
fn download_and_cache_roundtrip() {
    let key = generate_key();
    let dirs = repo_dirs();
    simple_repo(&dirs, &key, "file1.txt", CONTENT);

    let mut updater = updater(&dirs);
    let info = updater.get_target_info("file1.txt").unwrap().unwrap();

    let outpath = dirs.tmp.path().join("out").join("file1.txt");
    updater.download_target(&info, &outpath, None).unwrap();
    assert_eq!(std::fs::read(&outpath).unwrap(), CONTENT);

    // The freshly downloaded file satisfies the descriptor.
    assert_eq!(
        updater.find_cached_target(&info, &outpath),
        Some(outpath.clone())
    );

    // A corrupted cache entry does not.
    std::fs::write(&outpath, b"corrupted").unwrap();
    assert_eq!(updater.find_cached_target(&info, &outpath), None);

    // Same length, different bytes: still rejected.
    std::fs::write(&outpath, b"Tampered contents of file1!!!!\n").unwrap();
    assert_eq!(updater.find_cached_target(&info, &outpath), None);

    // A missing file is simply "not cached".
    std::fs::remove_file(&outpath).unwrap();
    assert_eq!(updater.find_cached_target(&info, &outpath), None);
}

#[test]
fn download_rejects_tampered_target() {
    let key = generate_key();
    let dirs = repo_dirs();
    simple_repo(&dirs, &key, "file1.txt", CONTENT);

    let mut updater = updater(&dirs);
    let info = updater.get_target_info("file1.txt").unwrap().unwrap();

    // Same length, wrong bytes: the digest check fails at end of stream.
    std::fs::write(
        dirs.targets.join("file1.txt"),
        b"Tampered contents of file1!!!!\n",
    )
    .unwrap();
    let outpath = dirs.tmp.path().join("tampered.txt");
    let err = updater.download_target(&info, &outpath, None).unwrap_err();
    assert!(matches!(err, Error::HashMismatch { .. }), "{err}");

    // Longer than declared: the transfer is aborted at the size cap.
    let mut oversized = CONTENT.to_vec();
    oversized.extend_from_slice(b"... and then some");
    std::fs::write(dirs.targets.join("file1.txt"), &oversized).unwrap();
    let err = updater.download_target(&info, &outpath, None).unwrap_err();
    assert!(matches!(err, Error::MaxSizeExceeded { .. }), "{err}");
}

/// Under a consistent-snapshot repository, metadata is fetched under versioned names and
/// targets under digest-prefixed names.
#[test]
fn consistent_snapshot_naming() {
    let key = generate_key();
    let dirs = repo_dirs();

    let root = sign_role(make_root(1, true, &key), &[&key]);
    write_signed(&dirs.local.join("root.json"), &root);

    let mut targets = make_targets(1);
    add_target(&mut targets, "file1.txt", CONTENT);
    add_target(&mut targets, "dir/file2.bin", b"nested target");
    write_signed(
        &dirs.metadata.join("1.targets.json"),
        &sign_role(targets, &[&key]),
    );

    let snapshot = sign_role(make_snapshot(1, &[("targets", 1)]), &[&key]);
    let snapshot_bytes = to_bytes(&snapshot);
    std::fs::write(dirs.metadata.join("1.snapshot.json"), &snapshot_bytes).unwrap();

    write_signed(
        &dirs.metadata.join("timestamp.json"),
        &sign_role(
            make_timestamp(
                1,
                meta_file(
                    1,
                    Some(snapshot_bytes.len() as u64),
                    Some(digest(&SHA256, &snapshot_bytes).as_ref()),
                ),
            ),
            &[&key],
        ),
    );

    // Targets live under digest-prefixed basenames.
    let file1_hash = hex::encode(digest(&SHA256, CONTENT));
    std::fs::write(dirs.targets.join(format!("{file1_hash}.file1.txt")), CONTENT).unwrap();
    let file2_hash = hex::encode(digest(&SHA256, b"nested target".as_slice()));
    std::fs::create_dir_all(dirs.targets.join("dir")).unwrap();
    std::fs::write(
        dirs.targets.join("dir").join(format!("{file2_hash}.file2.bin")),
        b"nested target",
    )
    .unwrap();

    let mut updater = updater(&dirs);
    updater.refresh().unwrap();

    let info = updater.get_target_info("file1.txt").unwrap().unwrap();
    let outpath = dirs.tmp.path().join("file1.txt");
    updater.download_target(&info, &outpath, None).unwrap();
    assert_eq!(std::fs::read(&outpath).unwrap(), CONTENT);

    let info = updater.get_target_info("dir/file2.bin").unwrap().unwrap();
    let outpath = dirs.tmp.path().join("file2.bin");
    updater.download_target(&info, &outpath, None).unwrap();
    assert_eq!(std::fs::read(&outpath).unwrap(), b"nested target");
}

#[test]
fn download_requires_a_targets_base_url() {
    let key = generate_key();
    let dirs = repo_dirs();
    simple_repo(&dirs, &key, "file1.txt", CONTENT);

    let mut settings = settings(&dirs);
    let explicit_base = settings.targets_base_url.take().unwrap();
    let mut updater = updater_with(settings);

    let info = updater.get_target_info("file1.txt").unwrap().unwrap();
    let outpath = dirs.tmp.path().join("file1.txt");

    let err = updater.download_target(&info, &outpath, None).unwrap_err();
    assert!(matches!(err, Error::MissingTargetsBaseUrl), "{err}");

    // An explicit base URL on the call overrides the missing configuration.
    updater
        .download_target(&info, &outpath, Some(&explicit_base))
        .unwrap();
    assert_eq!(std::fs::read(&outpath).unwrap(), CONTENT);
}
