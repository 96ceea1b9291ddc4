// Copyright Staunch Contributors.
// SPDX-License-Identifier: MIT OR Apache-2.0

mod test_utils;

use ring::digest::{digest, SHA256};
use staunch::{Error, Limits};
use test_utils::*;

/// A fresh client refreshes against a minimal repository and can resolve its one target.
#[test]
fn happy_refresh() {
    let key = generate_key();
    let dirs = repo_dirs();
    let content = b"Contents of file1 for testing.\n";
    simple_repo(&dirs, &key, "file1.txt", content);

    let mut updater = updater(&dirs);
    updater.refresh().unwrap();

    assert_eq!(u64::from(updater.root().unwrap().signed.version), 1);
    assert_eq!(u64::from(updater.timestamp().unwrap().signed.version), 1);
    assert_eq!(u64::from(updater.snapshot().unwrap().signed.version), 1);

    let info = updater.get_target_info("file1.txt").unwrap().unwrap();
    assert_eq!(info.length(), content.len() as u64);
    assert_eq!(info.sha256(), digest(&SHA256, content).as_ref());

    assert!(updater.get_target_info("no-such-file.txt").unwrap().is_none());
}

/// Accepted metadata is persisted to the local metadata directory, and a second refresh
/// succeeds from the stored files plus an unchanged remote.
#[test]
fn refresh_persists_metadata() {
    let key = generate_key();
    let dirs = repo_dirs();
    simple_repo(&dirs, &key, "file1.txt", b"Contents of file1 for testing.\n");

    let mut updater = updater(&dirs);
    updater.refresh().unwrap();

    for file in ["root.json", "timestamp.json", "snapshot.json", "targets.json"] {
        assert!(dirs.local.join(file).is_file(), "{file} was not persisted");
    }

    // The stored snapshot/targets are byte-identical to what the repository served.
    assert_eq!(
        std::fs::read(dirs.local.join("snapshot.json")).unwrap(),
        std::fs::read(dirs.metadata.join("snapshot.json")).unwrap()
    );

    let mut second = test_utils::updater(&dirs);
    second.refresh().unwrap();
    assert_eq!(u64::from(second.timestamp().unwrap().signed.version), 1);
}

/// The repository offers a rotated root signed by both the old and the new key; the chain
/// stops at the first missing version.
#[test]
fn root_rotation() {
    let key_a = generate_key();
    let key_b = generate_key();
    let dirs = repo_dirs();
    simple_repo(&dirs, &key_a, "file1.txt", b"Contents of file1 for testing.\n");

    // 2.root.json moves every role to key B. It must verify against v1 (key A) and against
    // itself (key B), so both sign it. 3.root.json does not exist.
    let root2 = sign_role(make_root(2, false, &key_b), &[&key_a, &key_b]);
    write_signed(&dirs.metadata.join("2.root.json"), &root2);

    // Re-sign the rest of the repository with the new key.
    let mut targets = make_targets(1);
    add_target(&mut targets, "file1.txt", b"Contents of file1 for testing.\n");
    write_signed(
        &dirs.metadata.join("targets.json"),
        &sign_role(targets, &[&key_b]),
    );
    let snapshot = sign_role(make_snapshot(1, &[("targets", 1)]), &[&key_b]);
    let snapshot_bytes = to_bytes(&snapshot);
    std::fs::write(dirs.metadata.join("snapshot.json"), &snapshot_bytes).unwrap();
    let timestamp = sign_role(
        make_timestamp(
            1,
            meta_file(
                1,
                Some(snapshot_bytes.len() as u64),
                Some(digest(&SHA256, &snapshot_bytes).as_ref()),
            ),
        ),
        &[&key_b],
    );
    write_signed(&dirs.metadata.join("timestamp.json"), &timestamp);

    let mut updater = updater(&dirs);
    updater.refresh().unwrap();

    assert_eq!(u64::from(updater.root().unwrap().signed.version), 2);

    // The rotated root replaced the stored trust anchor.
    let stored: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dirs.local.join("root.json")).unwrap()).unwrap();
    assert_eq!(stored["signed"]["version"], 2);
}

/// A rotated root not signed by the previously trusted root key is an attack, not the end of
/// the chain.
#[test]
fn root_rotation_requires_old_key() {
    let key_a = generate_key();
    let key_b = generate_key();
    let dirs = repo_dirs();
    simple_repo(&dirs, &key_a, "file1.txt", b"Contents of file1 for testing.\n");

    let root2 = sign_role(make_root(2, false, &key_b), &[&key_b]);
    write_signed(&dirs.metadata.join("2.root.json"), &root2);

    let mut updater = updater(&dirs);
    let err = updater.refresh().unwrap_err();
    assert!(matches!(err, Error::SignatureThreshold { .. }), "{err}");
}

/// The repository replays an older timestamp; the refresh fails and the stored timestamp is
/// untouched.
#[test]
fn timestamp_rollback() {
    let key = generate_key();
    let dirs = repo_dirs();

    let root = sign_role(make_root(1, false, &key), &[&key]);
    write_signed(&dirs.local.join("root.json"), &root);

    let mut targets = make_targets(1);
    add_target(&mut targets, "file1.txt", b"Contents of file1 for testing.\n");
    write_signed(
        &dirs.metadata.join("targets.json"),
        &sign_role(targets, &[&key]),
    );
    write_signed(
        &dirs.metadata.join("snapshot.json"),
        &sign_role(make_snapshot(10, &[("targets", 1)]), &[&key]),
    );
    write_signed(
        &dirs.metadata.join("timestamp.json"),
        &sign_role(make_timestamp(5, meta_file(10, None, None)), &[&key]),
    );

    let mut first = updater(&dirs);
    first.refresh().unwrap();
    assert_eq!(u64::from(first.timestamp().unwrap().signed.version), 5);

    // The mirror rolls the timestamp back to a well-signed version 4.
    write_signed(
        &dirs.metadata.join("timestamp.json"),
        &sign_role(make_timestamp(4, meta_file(10, None, None)), &[&key]),
    );

    let mut second = test_utils::updater(&dirs);
    let err = second.refresh().unwrap_err();
    assert!(matches!(err, Error::OlderMetadata { .. }), "{err}");

    // The trusted (stored) timestamp remains version 5.
    let stored: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dirs.local.join("timestamp.json")).unwrap())
            .unwrap();
    assert_eq!(stored["signed"]["version"], 5);
}

/// An equal-version timestamp means "nothing new": the refresh succeeds without rewriting the
/// stored file.
#[test]
fn equal_version_timestamp_is_a_no_op() {
    let key = generate_key();
    let dirs = repo_dirs();
    simple_repo(&dirs, &key, "file1.txt", b"Contents of file1 for testing.\n");

    let mut first = updater(&dirs);
    first.refresh().unwrap();

    let stored_before = std::fs::read(dirs.local.join("timestamp.json")).unwrap();

    let mut second = test_utils::updater(&dirs);
    second.refresh().unwrap();
    assert_eq!(u64::from(second.timestamp().unwrap().signed.version), 1);

    let stored_after = std::fs::read(dirs.local.join("timestamp.json")).unwrap();
    assert_eq!(stored_before, stored_after);
}

/// A timestamp larger than the configured ceiling is cut off mid-transfer.
#[test]
fn timestamp_length_cap() {
    let key = generate_key();
    let dirs = repo_dirs();
    simple_repo(&dirs, &key, "file1.txt", b"Contents of file1 for testing.\n");

    let mut settings = settings(&dirs);
    settings.limits = Limits {
        max_timestamp_size: 64,
        ..Limits::default()
    };
    let mut updater = updater_with(settings);

    let err = updater.refresh().unwrap_err();
    assert!(
        matches!(err, Error::MaxSizeExceeded { max_size: 64, .. }),
        "{err}"
    );
    assert!(updater.timestamp().is_none());
}

/// Without a local root the client cannot bootstrap.
#[test]
fn missing_local_root_is_fatal() {
    let key = generate_key();
    let dirs = repo_dirs();
    simple_repo(&dirs, &key, "file1.txt", b"Contents of file1 for testing.\n");
    std::fs::remove_file(dirs.local.join("root.json")).unwrap();

    let mut updater = updater(&dirs);
    let err = updater.refresh().unwrap_err();
    assert!(matches!(err, Error::LocalRootMissing), "{err}");
}

/// Expired non-root metadata is rejected at commit time; the `Unsafe` enforcement mode lets a
/// forensic client read the same repository anyway.
#[test]
fn expired_timestamp_is_rejected() {
    let key = generate_key();
    let dirs = repo_dirs();
    simple_repo(&dirs, &key, "file1.txt", b"Contents of file1 for testing.\n");

    let mut timestamp = make_timestamp(1, meta_file(1, None, None));
    timestamp.expires = in_the_past();
    write_signed(
        &dirs.metadata.join("timestamp.json"),
        &sign_role(timestamp, &[&key]),
    );
    // The snapshot length/hash pin from the original timestamp is gone, but the snapshot
    // still verifies against the root's snapshot role.

    let mut safe = updater(&dirs);
    let err = safe.refresh().unwrap_err();
    assert!(matches!(err, Error::ExpiredMetadata { .. }), "{err}");

    let mut settings = settings(&dirs);
    settings.expiration_enforcement = staunch::ExpirationEnforcement::Unsafe;
    let mut unsafe_updater = updater_with(settings);
    unsafe_updater.refresh().unwrap();
    assert_eq!(u64::from(unsafe_updater.timestamp().unwrap().signed.version), 1);
}
