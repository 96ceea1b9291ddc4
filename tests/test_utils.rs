// Copyright Staunch Contributors.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Utilities for tests. Repositories are generated at run time: ed25519 keys are created
//! fresh, metadata is built from the schema types and signed over its canonical form, and the
//! files are laid out in temp directories served through `FilesystemTransport`.
//!
//! Not every test module uses every helper, so unused warnings are suppressed per item.

use chrono::{DateTime, Utc};
use ring::digest::{digest, SHA256};
use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde::Serialize;
use staunch::schema::decoded::{Decoded, Hex};
use staunch::schema::key::{Ed25519Key, Ed25519Scheme, Key};
use staunch::schema::{
    Hashes, MetaFile, Role, RoleKeys, RoleType, Root, Signature, Signed, Snapshot, Target,
    Targets, Timestamp,
};
use staunch::{ExpirationEnforcement, FilesystemTransport, Limits, Settings, Updater};
use std::collections::HashMap;
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use url::Url;

/// A signing key pair together with its wire form and key ID.
pub struct TestKey {
    pub keypair: Ed25519KeyPair,
    pub key: Key,
    pub keyid: Decoded<Hex>,
}

#[allow(unused)]
pub fn generate_key() -> TestKey {
    let document = Ed25519KeyPair::generate_pkcs8(&SystemRandom::new()).unwrap();
    let keypair = Ed25519KeyPair::from_pkcs8(document.as_ref()).unwrap();
    let key = Key::Ed25519 {
        keyval: Ed25519Key {
            public: Decoded::from(keypair.public_key().as_ref().to_vec()),
            _extra: HashMap::new(),
        },
        scheme: Ed25519Scheme::Ed25519,
        _extra: HashMap::new(),
    };
    let keyid = key.key_id().unwrap();
    TestKey {
        keypair,
        key,
        keyid,
    }
}

#[allow(unused)]
pub fn nz(version: u64) -> NonZeroU64 {
    NonZeroU64::new(version).unwrap()
}

#[allow(unused)]
pub fn dt(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339)
        .unwrap()
        .with_timezone(&Utc)
}

/// An expiry comfortably in the future.
#[allow(unused)]
pub fn in_the_future() -> DateTime<Utc> {
    dt("2038-01-01T00:00:00Z")
}

/// An expiry in the past, for expired-metadata tests.
#[allow(unused)]
pub fn in_the_past() -> DateTime<Utc> {
    dt("2020-01-01T00:00:00Z")
}

/// Builds root metadata trusting `key` for every top-level role at threshold 1.
#[allow(unused)]
pub fn make_root(version: u64, consistent_snapshot: bool, key: &TestKey) -> Root {
    let mut keys = HashMap::new();
    keys.insert(key.keyid.clone(), key.key.clone());
    let mut roles = HashMap::new();
    for role in [
        RoleType::Root,
        RoleType::Timestamp,
        RoleType::Snapshot,
        RoleType::Targets,
    ] {
        roles.insert(
            role,
            RoleKeys {
                keyids: vec![key.keyid.clone()],
                threshold: nz(1),
                _extra: HashMap::new(),
            },
        );
    }
    Root {
        spec_version: "1.0.0".to_owned(),
        consistent_snapshot,
        version: nz(version),
        expires: in_the_future(),
        keys,
        roles,
        _extra: HashMap::new(),
    }
}

#[allow(unused)]
pub fn meta_file(version: u64, length: Option<u64>, sha256: Option<&[u8]>) -> MetaFile {
    MetaFile {
        length,
        hashes: sha256.map(|h| Hashes {
            sha256: Decoded::from(h.to_vec()),
            _extra: HashMap::new(),
        }),
        version: nz(version),
        _extra: HashMap::new(),
    }
}

/// Builds timestamp metadata describing `snapshot.json` at the given version, optionally with
/// the snapshot file's length and digest.
#[allow(unused)]
pub fn make_timestamp(version: u64, snapshot: MetaFile) -> Timestamp {
    let mut meta = HashMap::new();
    meta.insert("snapshot.json".to_owned(), snapshot);
    Timestamp {
        spec_version: "1.0.0".to_owned(),
        version: nz(version),
        expires: in_the_future(),
        meta,
        _extra: HashMap::new(),
    }
}

/// Builds snapshot metadata listing each `(role, version)` pair, without lengths or hashes.
#[allow(unused)]
pub fn make_snapshot(version: u64, entries: &[(&str, u64)]) -> Snapshot {
    let mut meta = HashMap::new();
    for (role, role_version) in entries {
        meta.insert(format!("{role}.json"), meta_file(*role_version, None, None));
    }
    Snapshot {
        spec_version: "1.0.0".to_owned(),
        version: nz(version),
        expires: in_the_future(),
        meta,
        _extra: HashMap::new(),
    }
}

#[allow(unused)]
pub fn make_targets(version: u64) -> Targets {
    Targets {
        spec_version: "1.0.0".to_owned(),
        version: nz(version),
        expires: in_the_future(),
        targets: HashMap::new(),
        delegations: None,
        _extra: HashMap::new(),
    }
}

/// A target descriptor for the given file contents.
#[allow(unused)]
pub fn make_target(content: &[u8]) -> Target {
    Target {
        length: content.len() as u64,
        hashes: Hashes {
            sha256: Decoded::from(digest(&SHA256, content).as_ref().to_vec()),
            _extra: HashMap::new(),
        },
        custom: HashMap::new(),
        _extra: HashMap::new(),
    }
}

#[allow(unused)]
pub fn add_target(targets: &mut Targets, name: &str, content: &[u8]) {
    targets.targets.insert(
        staunch::TargetName::new(name).unwrap(),
        make_target(content),
    );
}

/// Signs a role body with each key, over its canonical JSON form.
#[allow(unused)]
pub fn sign_role<T: Role>(role: T, keys: &[&TestKey]) -> Signed<T> {
    let canonical = role.canonical_form().unwrap();
    let signatures = keys
        .iter()
        .map(|key| Signature {
            keyid: key.keyid.clone(),
            sig: Decoded::from(key.keypair.sign(&canonical).as_ref().to_vec()),
        })
        .collect();
    Signed {
        signed: role,
        signatures,
    }
}

#[allow(unused)]
pub fn to_bytes<T: Serialize>(signed: &Signed<T>) -> Vec<u8> {
    serde_json::to_vec_pretty(signed).unwrap()
}

#[allow(unused)]
pub fn write_signed<T: Serialize>(path: &Path, signed: &Signed<T>) {
    std::fs::write(path, to_bytes(signed)).unwrap()
}

/// Converts a filepath into a URI formatted string.
#[allow(unused)]
pub fn dir_url<P: AsRef<Path>>(path: P) -> Url {
    Url::from_directory_path(path).unwrap()
}

/// A local metadata directory plus a "remote" repository directory tree. The `TempDir` is held
/// for its lifetime only.
#[allow(unused)]
pub struct RepoDirs {
    pub tmp: TempDir,
    pub local: PathBuf,
    pub metadata: PathBuf,
    pub targets: PathBuf,
}

#[allow(unused)]
pub fn repo_dirs() -> RepoDirs {
    let tmp = TempDir::new().unwrap();
    let local = tmp.path().join("local");
    let metadata = tmp.path().join("repo").join("metadata");
    let targets = tmp.path().join("repo").join("targets");
    std::fs::create_dir_all(&local).unwrap();
    std::fs::create_dir_all(&metadata).unwrap();
    std::fs::create_dir_all(&targets).unwrap();
    RepoDirs {
        tmp,
        local,
        metadata,
        targets,
    }
}

#[allow(unused)]
pub fn settings(dirs: &RepoDirs) -> Settings {
    Settings {
        metadata_dir: dirs.local.clone(),
        metadata_base_url: dir_url(&dirs.metadata),
        targets_base_url: Some(dir_url(&dirs.targets)),
        limits: Limits::default(),
        expiration_enforcement: ExpirationEnforcement::Safe,
        prefix_targets_with_hash: true,
    }
}

#[allow(unused)]
pub fn updater(dirs: &RepoDirs) -> Updater {
    updater_with(settings(dirs))
}

#[allow(unused)]
pub fn updater_with(settings: Settings) -> Updater {
    Updater::new(Box::new(FilesystemTransport), settings).unwrap()
}

/// Lays out a minimal happy-path repository: one key for every role, one target file, and
/// writes the v1 root into the local metadata directory as the trust anchor.
#[allow(unused)]
pub fn simple_repo(dirs: &RepoDirs, key: &TestKey, target_name: &str, content: &[u8]) {
    let root = sign_role(make_root(1, false, key), &[key]);
    write_signed(&dirs.local.join("root.json"), &root);
    write_signed(&dirs.metadata.join("1.root.json"), &root);

    let mut targets = make_targets(1);
    add_target(&mut targets, target_name, content);
    let targets = sign_role(targets, &[key]);
    write_signed(&dirs.metadata.join("targets.json"), &targets);

    let snapshot = sign_role(make_snapshot(1, &[("targets", 1)]), &[key]);
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
        &[key],
    );
    write_signed(&dirs.metadata.join("timestamp.json"), &timestamp);

    std::fs::write(dirs.targets.join(target_name), content).unwrap();
}
