// Copyright Staunch Contributors.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The trusted metadata set: the client's in-memory record of which metadata it currently
//! accepts as authoritative.
//!
//! The set is mutated only by the five update operations, each of which is all-or-nothing: a
//! new document is parsed, verified against the currently trusted predecessor, checked for
//! version regressions and expiry, and only then committed. The set never reverts to earlier
//! metadata.
//!
//! A single reference instant, fixed when the set is created, is used for every expiry check so
//! that checks within one refresh cannot disagree about "now".

use crate::error::{self, Result};
use crate::schema::decoded::{Decoded, Hex};
use crate::schema::key::Key;
use crate::schema::{
    MetaFile, Role, RoleKeys, RoleType, Root, Signature, Signed, Snapshot, Targets, Timestamp,
};
use crate::ExpirationEnforcement;
use chrono::{DateTime, Utc};
use log::debug;
use ring::digest::{digest, SHA256};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use snafu::{ensure, OptionExt, ResultExt};
use std::collections::{HashMap, HashSet};

/// The name under which the top-level targets role is tracked.
pub const TOP_LEVEL_TARGETS: &str = "targets";

/// The currently trusted metadata, at most one accepted document per role.
#[derive(Debug)]
pub struct TrustedSet {
    root: Signed<Root>,
    timestamp: Option<Signed<Timestamp>>,
    snapshot: Option<Signed<Snapshot>>,
    /// The top-level targets role (under `"targets"`) and every accepted delegated role.
    targets: HashMap<String, Signed<Targets>>,
    reference_time: DateTime<Utc>,
    expiration_enforcement: ExpirationEnforcement,
}

impl TrustedSet {
    /// Creates a trusted set from the locally stored root metadata. The document must be
    /// signed by its own `root` role at its own threshold; expiry is not checked, because an
    /// expired local root can still authenticate its successors.
    pub fn new(
        root_bytes: &[u8],
        reference_time: DateTime<Utc>,
        expiration_enforcement: ExpirationEnforcement,
    ) -> Result<Self> {
        let root: Signed<Root> = parse_metadata(root_bytes)?;
        check_root_key_references(&root.signed)?;
        let canonical = canonical_form(&root.signed)?;
        verify_signatures(
            &canonical,
            &root.signatures,
            root_role_keys(&root.signed, RoleType::Root)?,
            &root.signed.keys,
            "root",
        )?;
        debug!("loaded trusted root version {}", root.signed.version);
        Ok(Self {
            root,
            timestamp: None,
            snapshot: None,
            targets: HashMap::new(),
            reference_time,
            expiration_enforcement,
        })
    }

    /// The currently trusted root metadata.
    pub fn root(&self) -> &Signed<Root> {
        &self.root
    }

    /// The currently trusted timestamp metadata, if any has been accepted.
    pub fn timestamp(&self) -> Option<&Signed<Timestamp>> {
        self.timestamp.as_ref()
    }

    /// The currently trusted snapshot metadata, if any has been accepted.
    pub fn snapshot(&self) -> Option<&Signed<Snapshot>> {
        self.snapshot.as_ref()
    }

    /// The accepted targets metadata for `role_name` (`"targets"` for the top-level role).
    pub fn targets_by_name(&self, role_name: &str) -> Option<&Signed<Targets>> {
        self.targets.get(role_name)
    }

    /// Accepts the next root metadata version.
    ///
    /// The new root must be signed both by the currently trusted root's `root` role and by its
    /// own: the trusted chain must admit it, and it must be able to stand on its own once the
    /// old keys are gone. Its version must be exactly one greater than the trusted version.
    /// Expiry is deliberately not checked: a chain of rotations may pass through expired
    /// intermediates.
    pub fn update_root(&mut self, bytes: &[u8]) -> Result<()> {
        ensure!(self.snapshot.is_none(), error::RootUpdateAfterSnapshotSnafu);

        let new: Signed<Root> = parse_metadata(bytes)?;
        check_root_key_references(&new.signed)?;
        let canonical = canonical_form(&new.signed)?;
        verify_signatures(
            &canonical,
            &new.signatures,
            root_role_keys(&self.root.signed, RoleType::Root)?,
            &self.root.signed.keys,
            "root",
        )?;
        verify_signatures(
            &canonical,
            &new.signatures,
            root_role_keys(&new.signed, RoleType::Root)?,
            &new.signed.keys,
            "root",
        )?;

        let expected = self.root.signed.version.get() + 1;
        let found = new.signed.version.get();
        ensure!(
            found == expected,
            error::UnexpectedRootVersionSnafu { expected, found }
        );

        debug!("updated root metadata to version {found}");
        self.root = new;
        Ok(())
    }

    /// Accepts new timestamp metadata.
    ///
    /// Returns `Error::EqualVersion` when the offered version is the trusted version; callers
    /// treat that as "already up to date" rather than a failure.
    pub fn update_timestamp(&mut self, bytes: &[u8]) -> Result<()> {
        self.check_expiry(&self.root.signed, "root")?;

        let new: Signed<Timestamp> = parse_metadata(bytes)?;
        verify_signatures(
            &canonical_form(&new.signed)?,
            &new.signatures,
            root_role_keys(&self.root.signed, RoleType::Timestamp)?,
            &self.root.signed.keys,
            "timestamp",
        )?;

        if let Some(current) = &self.timestamp {
            let current_version = current.signed.version.get();
            let new_version = new.signed.version.get();
            ensure!(
                new_version != current_version,
                error::EqualVersionSnafu {
                    role: "timestamp",
                    version: new_version,
                }
            );
            ensure!(
                new_version > current_version,
                error::OlderMetadataSnafu {
                    role: "timestamp",
                    current_version,
                    new_version,
                }
            );

            // A newer timestamp must not walk the snapshot version backwards either.
            let current_snapshot = snapshot_meta(&current.signed)?.version.get();
            let new_snapshot = snapshot_meta(&new.signed)?.version.get();
            ensure!(
                new_snapshot >= current_snapshot,
                error::OlderMetadataSnafu {
                    role: "snapshot (described by timestamp)",
                    current_version: current_snapshot,
                    new_version: new_snapshot,
                }
            );
        } else {
            // Validate the shape up front so later snapshot updates can rely on the entry.
            snapshot_meta(&new.signed)?;
        }

        self.check_expiry(&new.signed, "timestamp")?;

        debug!("updated timestamp metadata to version {}", new.signed.version);
        self.timestamp = Some(new);
        Ok(())
    }

    /// Accepts new snapshot metadata.
    ///
    /// With `trusted_local` set, the byte-level length and hash checks against the timestamp's
    /// descriptor are skipped; this is used for snapshot metadata read back from the local
    /// metadata directory, which was verified when it was stored. All other checks still apply,
    /// including that the version must equal the one the timestamp declares.
    pub fn update_snapshot(&mut self, bytes: &[u8], trusted_local: bool) -> Result<()> {
        let timestamp = self
            .timestamp
            .as_ref()
            .context(error::MissingTrustedRoleSnafu { role: "timestamp" })?;
        self.check_expiry(&timestamp.signed, "timestamp")?;

        let meta = snapshot_meta(&timestamp.signed)?;
        if !trusted_local {
            check_length_and_hashes(bytes, meta, "snapshot.json", LengthRule::Exact)?;
        }

        let new: Signed<Snapshot> = parse_metadata(bytes)?;
        verify_signatures(
            &canonical_form(&new.signed)?,
            &new.signatures,
            root_role_keys(&self.root.signed, RoleType::Snapshot)?,
            &self.root.signed.keys,
            "snapshot",
        )?;

        let declared = meta.version.get();
        let found = new.signed.version.get();
        ensure!(
            found == declared,
            error::VersionMismatchSnafu {
                role: "snapshot",
                expected: declared,
                found,
            }
        );

        // On re-update, every targets role the old snapshot knew must still be present and must
        // not have moved backwards.
        if let Some(current) = &self.snapshot {
            for (file, current_meta) in &current.signed.meta {
                let new_meta = new.signed.meta.get(file).context(error::MetaMissingSnafu {
                    file: file.clone(),
                    role: "snapshot",
                })?;
                ensure!(
                    new_meta.version >= current_meta.version,
                    error::OlderMetadataSnafu {
                        role: file.clone(),
                        current_version: current_meta.version.get(),
                        new_version: new_meta.version.get(),
                    }
                );
            }
        }

        self.check_expiry(&new.signed, "snapshot")?;

        debug!("updated snapshot metadata to version {found}");
        self.snapshot = Some(new);
        // Previously accepted targets metadata may describe files the new snapshot no longer
        // vouches for; it must be re-validated against the new snapshot.
        self.targets.clear();
        Ok(())
    }

    /// Accepts new top-level targets metadata.
    pub fn update_targets(&mut self, bytes: &[u8]) -> Result<()> {
        self.update_delegated_targets(bytes, TOP_LEVEL_TARGETS, "root")
    }

    /// Accepts new targets metadata for `role_name`, verified against the keys its delegating
    /// parent declares for it. The parent of the top-level targets role is root.
    pub fn update_delegated_targets(
        &mut self,
        bytes: &[u8],
        role_name: &str,
        parent_name: &str,
    ) -> Result<()> {
        let snapshot = self
            .snapshot
            .as_ref()
            .context(error::MissingTrustedRoleSnafu { role: "snapshot" })?;
        self.check_expiry(&snapshot.signed, "snapshot")?;

        // The delegating parent must already be trusted before the snapshot is even consulted
        // for this role. The top-level targets role is delegated by root, which always is.
        ensure!(
            role_name == TOP_LEVEL_TARGETS || self.targets.contains_key(parent_name),
            error::MissingTrustedRoleSnafu { role: parent_name }
        );

        let meta = snapshot
            .signed
            .role_meta(role_name)
            .context(error::MetaMissingSnafu {
                file: format!("{role_name}.json"),
                role: "snapshot",
            })?;
        check_length_and_hashes(bytes, meta, "targets metadata", LengthRule::AtMost)?;

        let new: Signed<Targets> = parse_metadata(bytes)?;

        if role_name == TOP_LEVEL_TARGETS {
            verify_signatures(
                &canonical_form(&new.signed)?,
                &new.signatures,
                root_role_keys(&self.root.signed, RoleType::Targets)?,
                &self.root.signed.keys,
                "targets",
            )?;
        } else {
            let parent = self
                .targets
                .get(parent_name)
                .context(error::MissingTrustedRoleSnafu { role: parent_name })?;
            let delegations =
                parent
                    .signed
                    .delegations
                    .as_ref()
                    .context(error::DelegationMissingSnafu {
                        name: role_name,
                        parent: parent_name,
                    })?;
            let role = parent
                .signed
                .delegated_role(role_name)
                .context(error::DelegationMissingSnafu {
                    name: role_name,
                    parent: parent_name,
                })?;
            verify_signatures(
                &canonical_form(&new.signed)?,
                &new.signatures,
                &role.keys(),
                &delegations.keys,
                role_name,
            )?;
        }

        let declared = meta.version.get();
        let found = new.signed.version.get();
        ensure!(
            found == declared,
            error::VersionMismatchSnafu {
                role: role_name,
                expected: declared,
                found,
            }
        );

        self.check_expiry(&new.signed, role_name)?;

        debug!("updated '{role_name}' targets metadata to version {found}");
        self.targets.insert(role_name.to_owned(), new);
        Ok(())
    }

    fn check_expiry<T: Role>(&self, role: &T, name: &str) -> Result<()> {
        if self.expiration_enforcement == ExpirationEnforcement::Unsafe {
            return Ok(());
        }
        ensure!(
            !role.is_expired(self.reference_time),
            error::ExpiredMetadataSnafu { role: name }
        );
        Ok(())
    }
}

/// The length rule applied when checking bytes against a metadata descriptor.
enum LengthRule {
    /// The byte count must equal the declared length.
    Exact,
    /// The byte count must not exceed the declared length.
    AtMost,
}

/// Verifies raw metadata bytes against the length and hashes another role declared for them.
/// Both fields are optional in the descriptor; absent fields are not checked.
fn check_length_and_hashes(
    bytes: &[u8],
    meta: &MetaFile,
    context: &str,
    rule: LengthRule,
) -> Result<()> {
    if let Some(length) = meta.length {
        let found = bytes.len() as u64;
        let ok = match rule {
            LengthRule::Exact => found == length,
            LengthRule::AtMost => found <= length,
        };
        ensure!(
            ok,
            error::LengthMismatchSnafu {
                context,
                found,
                expected: length,
            }
        );
    }
    if let Some(hashes) = &meta.hashes {
        let calculated = digest(&SHA256, bytes);
        ensure!(
            calculated.as_ref() == hashes.sha256.bytes(),
            error::HashMismatchSnafu {
                context,
                calculated: hex::encode(calculated),
                expected: hashes.sha256.to_string(),
            }
        );
    }
    Ok(())
}

/// Parses a signed metadata document, requiring its declared `_type` to match the role being
/// parsed. Without the explicit check, roles with identical shapes (timestamp and snapshot)
/// could be confused for one another by a hostile mirror.
pub(crate) fn parse_metadata<T>(bytes: &[u8]) -> Result<Signed<T>>
where
    T: Role + DeserializeOwned,
{
    #[derive(Deserialize)]
    struct Probe {
        signed: ProbeSigned,
    }

    #[derive(Deserialize)]
    struct ProbeSigned {
        #[serde(rename = "_type")]
        tag: String,
    }

    let role = T::TYPE.to_string();
    let probe: Probe =
        serde_json::from_slice(bytes).context(error::ParseMetadataSnafu { role: role.clone() })?;
    ensure!(
        probe.signed.tag == role,
        error::WrongMetadataTypeSnafu {
            expected: role,
            found: probe.signed.tag,
        }
    );
    serde_json::from_slice(bytes).context(error::ParseMetadataSnafu { role })
}

/// Counts the distinct keys from the role's keyid list whose signatures over `canonical`
/// verify, and requires at least the role's threshold of them.
///
/// A key that fails to verify, or has no signature in the envelope, is simply not counted; the
/// only fatal conditions are a keyid that cannot be resolved in the key map and a final count
/// below the threshold.
fn verify_signatures(
    canonical: &[u8],
    signatures: &[Signature],
    role_keys: &RoleKeys,
    keys: &HashMap<Decoded<Hex>, Key>,
    role_name: &str,
) -> Result<()> {
    let mut contributing: HashSet<&Decoded<Hex>> = HashSet::new();
    for keyid in &role_keys.keyids {
        let key = keys.get(keyid).context(error::KeyMissingSnafu {
            keyid: hex::encode(keyid),
            role: role_name,
        })?;
        let Some(signature) = signatures.iter().find(|s| &s.keyid == keyid) else {
            continue;
        };
        if key.verify(canonical, &signature.sig) {
            contributing.insert(keyid);
        }
    }

    let threshold = role_keys.threshold.get();
    let valid = contributing.len() as u64;
    ensure!(
        valid >= threshold,
        error::SignatureThresholdSnafu {
            role: role_name,
            valid,
            threshold,
        }
    );
    Ok(())
}

fn canonical_form<T: Role>(role: &T) -> Result<Vec<u8>> {
    role.canonical_form().context(error::SchemaSnafu)
}

fn root_role_keys(root: &Root, role: RoleType) -> Result<&RoleKeys> {
    root.role_keys(role).context(error::RoleMissingSnafu {
        role: role.to_string(),
    })
}

fn snapshot_meta(timestamp: &Timestamp) -> Result<&MetaFile> {
    timestamp
        .snapshot_meta()
        .context(error::MetaMissingSnafu {
            file: "snapshot.json",
            role: "timestamp",
        })
}

/// Requires every keyid referenced by a top-level role to resolve in the root's key map, and
/// each role's keyid list to be free of duplicates.
fn check_root_key_references(root: &Root) -> Result<()> {
    for (role_type, role_keys) in &root.roles {
        let mut seen = HashSet::new();
        for keyid in &role_keys.keyids {
            ensure!(
                root.keys.contains_key(keyid),
                error::KeyMissingSnafu {
                    keyid: hex::encode(keyid),
                    role: role_type.to_string(),
                }
            );
            ensure!(
                seen.insert(keyid),
                error::DuplicateKeyIdSnafu {
                    keyid: hex::encode(keyid),
                    role: role_type.to_string(),
                }
            );
        }
    }
    Ok(())
}
