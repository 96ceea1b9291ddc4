// Copyright Staunch Contributors.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provides the metadata schema objects as defined by the TUF specification.
//!
//! Every metadata document is a [`Signed`] envelope around one of the four role bodies
//! ([`Root`], [`Timestamp`], [`Snapshot`], [`Targets`]). Signatures cover the canonical JSON
//! form of the `signed` object, so unrecognized fields encountered during deserialization are
//! retained in `_extra` maps and written back out on serialization.

mod de;
pub mod decoded;
mod error;
pub mod key;
mod spki;

pub use crate::schema::error::{Error, Result};

use crate::schema::decoded::{Decoded, Hex};
use crate::schema::key::Key;
use crate::target_name::TargetName;
use chrono::{DateTime, Utc};
use globset::Glob;
use olpc_cjson::CanonicalFormatter;
use ring::digest::{digest, SHA256};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_plain::{forward_display_to_serde, forward_from_str_to_serde};
use snafu::ResultExt;
use std::collections::HashMap;
use std::num::NonZeroU64;

/// The type of metadata role.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum RoleType {
    /// The root role delegates trust to specific keys trusted for all other top-level roles used
    /// in the system.
    Root,
    /// The snapshot role signs a metadata file that provides information about the latest version
    /// of all targets metadata on the repository (the top-level targets role and all delegated
    /// roles).
    Snapshot,
    /// The targets role's signature indicates which target files are trusted by clients.
    Targets,
    /// The timestamp role is used to prevent an adversary from replaying an out-of-date signed
    /// metadata file whose signature has not yet expired.
    Timestamp,
}

forward_display_to_serde!(RoleType);
forward_from_str_to_serde!(RoleType);

/// Common trait implemented by all roles.
pub trait Role: Serialize {
    /// The type of role this object represents.
    const TYPE: RoleType;

    /// Determines when metadata should be considered expired and no longer trusted by clients.
    fn expires(&self) -> DateTime<Utc>;

    /// An integer that is greater than 0. Clients MUST NOT replace a metadata file with a
    /// version number less than the one currently trusted.
    fn version(&self) -> NonZeroU64;

    /// Whether this metadata is expired at the reference time `now`.
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires()
    }

    /// A deterministic JSON serialization used when verifying the signatures over a metadata
    /// object. [More info on canonical JSON](http://wiki.laptop.org/go/Canonical_JSON)
    fn canonical_form(&self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut data, CanonicalFormatter::new());
        self.serialize(&mut ser)
            .context(error::JsonSerializationSnafu { what: "role" })?;
        Ok(data)
    }
}

/// A signed metadata object.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Signed<T> {
    /// The role that is signed.
    pub signed: T,
    /// A list of signatures and their key IDs.
    pub signatures: Vec<Signature>,
}

/// A signature and the key ID that made it.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Signature {
    /// The key ID (listed in root.json) that made this signature.
    pub keyid: Decoded<Hex>,
    /// A hex-encoded signature of the canonical JSON form of a role.
    pub sig: Decoded<Hex>,
}

// =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=

/// The root metadata file is the locus of trust: it lists the keys and signing thresholds for
/// every top-level role, including the root role itself. Revocation and replacement of top-level
/// role keys is done by publishing a new version of this file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "_type")]
#[serde(rename = "root")]
pub struct Root {
    /// The version number of the TUF specification this metadata follows. Only the major
    /// component is enforced, at parse time.
    #[serde(deserialize_with = "de::spec_version")]
    pub spec_version: String,

    /// Whether the repository supports consistent snapshots. When true, non-timestamp metadata
    /// and (optionally) targets are addressed by version- or digest-prefixed filenames.
    pub consistent_snapshot: bool,

    /// An integer that is greater than 0. Clients MUST NOT replace a metadata file with a
    /// version number less than the one currently trusted.
    pub version: NonZeroU64,

    /// Determines when metadata should be considered expired and no longer trusted by clients.
    pub expires: DateTime<Utc>,

    /// The public keys trusted for top-level roles, by key ID. Each key ID is validated against
    /// the key's contents during deserialization.
    #[serde(deserialize_with = "de::deserialize_keys")]
    pub keys: HashMap<Decoded<Hex>, Key>,

    /// For each top-level role, the key IDs trusted to sign it and the signature threshold.
    pub roles: HashMap<RoleType, RoleKeys>,

    /// Extra fields found during deserialization, retained so signatures over this object remain
    /// verifiable.
    #[serde(flatten)]
    #[serde(deserialize_with = "de::extra_skip_type")]
    pub _extra: HashMap<String, Value>,
}

/// The key IDs trusted to sign a role and the number of their signatures required to accept it.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RoleKeys {
    /// The key IDs used for the role.
    pub keyids: Vec<Decoded<Hex>>,

    /// The threshold of signatures required to validate the role.
    pub threshold: NonZeroU64,

    /// Extra fields found during deserialization.
    #[serde(flatten)]
    pub _extra: HashMap<String, Value>,
}

impl Root {
    /// The key IDs and threshold for a top-level role, if the role is declared.
    pub fn role_keys(&self, role: RoleType) -> Option<&RoleKeys> {
        self.roles.get(&role)
    }
}

impl Role for Root {
    const TYPE: RoleType = RoleType::Root;

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    fn version(&self) -> NonZeroU64 {
        self.version
    }
}

// =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=

/// The timestamp metadata file names the current version of the snapshot metadata. It is
/// re-signed frequently to limit how long a client can be kept unaware of interference with its
/// updates.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "_type")]
#[serde(rename = "timestamp")]
pub struct Timestamp {
    /// The version number of the TUF specification this metadata follows.
    #[serde(deserialize_with = "de::spec_version")]
    pub spec_version: String,

    /// An integer that is greater than 0. Clients MUST NOT replace a metadata file with a
    /// version number less than the one currently trusted.
    pub version: NonZeroU64,

    /// Determines when metadata should be considered expired and no longer trusted by clients.
    pub expires: DateTime<Utc>,

    /// Describes the current snapshot metadata. This map holds exactly one entry, keyed
    /// `"snapshot.json"`.
    pub meta: HashMap<String, MetaFile>,

    /// Extra fields found during deserialization.
    #[serde(flatten)]
    #[serde(deserialize_with = "de::extra_skip_type")]
    pub _extra: HashMap<String, Value>,
}

impl Timestamp {
    /// The descriptor for the current snapshot metadata, if present.
    pub fn snapshot_meta(&self) -> Option<&MetaFile> {
        self.meta.get("snapshot.json")
    }
}

impl Role for Timestamp {
    const TYPE: RoleType = RoleType::Timestamp;

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    fn version(&self) -> NonZeroU64 {
        self.version
    }
}

// =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=

/// The snapshot metadata file lists the version of every targets metadata file on the
/// repository, pinning the combination a client may accept at one point in time.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "_type")]
#[serde(rename = "snapshot")]
pub struct Snapshot {
    /// The version number of the TUF specification this metadata follows.
    #[serde(deserialize_with = "de::spec_version")]
    pub spec_version: String,

    /// An integer that is greater than 0. Clients MUST NOT replace a metadata file with a
    /// version number less than the one currently trusted.
    pub version: NonZeroU64,

    /// Determines when metadata should be considered expired and no longer trusted by clients.
    pub expires: DateTime<Utc>,

    /// A descriptor for every top-level and delegated targets metadata file known to the
    /// snapshot, keyed `"<role>.json"`.
    pub meta: HashMap<String, MetaFile>,

    /// Extra fields found during deserialization.
    #[serde(flatten)]
    #[serde(deserialize_with = "de::extra_skip_type")]
    pub _extra: HashMap<String, Value>,
}

impl Snapshot {
    /// The descriptor for a named targets role, if the snapshot knows it.
    pub fn role_meta(&self, role_name: &str) -> Option<&MetaFile> {
        self.meta.get(&format!("{role_name}.json"))
    }
}

impl Role for Snapshot {
    const TYPE: RoleType = RoleType::Snapshot;

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    fn version(&self) -> NonZeroU64 {
        self.version
    }
}

/// Describes a metadata file listed in the timestamp or snapshot metadata.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MetaFile {
    /// The integer length in bytes of the described metadata file. Optional; when absent the
    /// client falls back to a configured download limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,

    /// Hashes of the described metadata file. Optional; when absent the version number alone
    /// identifies the file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hashes: Option<Hashes>,

    /// The version number of the described metadata file.
    pub version: NonZeroU64,

    /// Extra fields found during deserialization.
    #[serde(flatten)]
    pub _extra: HashMap<String, Value>,
}

/// A hash dictionary for a metadata or target file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Hashes {
    /// The SHA-256 digest of the file.
    pub sha256: Decoded<Hex>,

    /// Digests under other algorithms; preserved, but not used for verification.
    #[serde(flatten)]
    pub _extra: HashMap<String, Value>,
}

// =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=

/// A targets metadata file maps target paths to descriptions of the corresponding target files,
/// and may delegate authority over subsets of those paths to further roles.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "_type")]
#[serde(rename = "targets")]
pub struct Targets {
    /// The version number of the TUF specification this metadata follows.
    #[serde(deserialize_with = "de::spec_version")]
    pub spec_version: String,

    /// An integer that is greater than 0. Clients MUST NOT replace a metadata file with a
    /// version number less than the one currently trusted.
    pub version: NonZeroU64,

    /// Determines when metadata should be considered expired and no longer trusted by clients.
    pub expires: DateTime<Utc>,

    /// The target files this role vouches for, keyed by target path relative to the targets
    /// base URL.
    pub targets: HashMap<TargetName, Target>,

    /// Delegations of subsets of the target namespace to further roles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegations: Option<Delegations>,

    /// Extra fields found during deserialization.
    #[serde(flatten)]
    #[serde(deserialize_with = "de::extra_skip_type")]
    pub _extra: HashMap<String, Value>,
}

impl Targets {
    /// The description of a target in this role's own `targets` map. Delegations are not
    /// consulted; walking the delegation graph is the resolver's job.
    pub fn target(&self, name: &TargetName) -> Option<&Target> {
        self.targets.get(name)
    }

    /// The delegated role named `name` declared by this role, if any.
    pub fn delegated_role(&self, name: &str) -> Option<&DelegatedRole> {
        self.delegations
            .as_ref()
            .and_then(|delegations| delegations.role(name))
    }
}

impl Role for Targets {
    const TYPE: RoleType = RoleType::Targets;

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    fn version(&self) -> NonZeroU64 {
        self.version
    }
}

/// Describes a target file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Target {
    /// The integer length in bytes of the target file.
    pub length: u64,

    /// Hashes of the target file's contents.
    pub hashes: Hashes,

    /// Opaque application data about this target. The framework does not interpret it, but
    /// applications commonly key download decisions off it.
    #[serde(default)]
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub custom: HashMap<String, Value>,

    /// Extra fields found during deserialization.
    #[serde(flatten)]
    pub _extra: HashMap<String, Value>,
}

/// The delegations object of a targets metadata file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Delegations {
    /// The public keys available to delegated roles, by key ID. Each key ID is validated against
    /// the key's contents during deserialization.
    #[serde(deserialize_with = "de::deserialize_keys")]
    pub keys: HashMap<Decoded<Hex>, Key>,

    /// The delegated roles, in order of decreasing trust: during target resolution the first
    /// matching role encountered in a preorder walk wins.
    pub roles: Vec<DelegatedRole>,

    /// Extra fields found during deserialization.
    #[serde(flatten)]
    pub _extra: HashMap<String, Value>,
}

impl Delegations {
    /// The delegated role named `name`, if this delegations object declares it.
    pub fn role(&self, name: &str) -> Option<&DelegatedRole> {
        self.roles.iter().find(|role| role.name == name)
    }
}

/// A single delegation of authority over part of the target namespace.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DelegatedRole {
    /// The name of the delegated role, e.g. "projects".
    pub name: String,

    /// The key IDs used by this role.
    pub keyids: Vec<Decoded<Hex>>,

    /// The threshold of signatures required to validate the role.
    pub threshold: NonZeroU64,

    /// The portion of the target namespace this role is trusted for.
    #[serde(flatten)]
    pub paths: PathSet,

    /// If true, a match on this role forbids consulting later sibling delegations for the same
    /// target.
    pub terminating: bool,
}

impl DelegatedRole {
    /// The role's key IDs and threshold in [`RoleKeys`] form, for signature verification.
    pub fn keys(&self) -> RoleKeys {
        RoleKeys {
            keyids: self.keyids.clone(),
            threshold: self.threshold,
            _extra: HashMap::new(),
        }
    }

    /// Whether this delegation's path predicate covers `target`.
    pub fn matches_target(&self, target: &TargetName) -> bool {
        self.paths.matches_target(target)
    }
}

/// The target paths a delegated role controls: either a list of shell-style path patterns or a
/// list of hex prefixes that the SHA-256 of a target path may fall under. Exactly one of the two
/// is present on the wire.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum PathSet {
    /// Shell-style path patterns following the Unix filename pattern matching convention:
    /// `targets/*.tgz` matches `targets/foo.tgz` but not `targets/foo.txt`, and `*` also
    /// spans directory separators, so `*.txt` matches `dir/notes.txt`.
    #[serde(rename = "paths")]
    Paths(Vec<String>),

    /// Hex digest prefixes: a target path matches when the lowercase hex SHA-256 of the path
    /// starts with any listed prefix. Used to split large target sets into hashed bins.
    #[serde(rename = "path_hash_prefixes")]
    PathHashPrefixes(Vec<String>),
}

impl PathSet {
    /// Whether `target` falls inside this path set.
    pub fn matches_target(&self, target: &TargetName) -> bool {
        match self {
            Self::Paths(patterns) => patterns
                .iter()
                .any(|pattern| Self::matches_path(pattern, target)),
            Self::PathHashPrefixes(prefixes) => prefixes
                .iter()
                .any(|prefix| Self::matches_prefix(prefix, target)),
        }
    }

    fn matches_path(pattern: &str, target: &TargetName) -> bool {
        let Ok(glob) = Glob::new(pattern) else {
            return false;
        };
        glob.compile_matcher().is_match(target.resolved())
    }

    fn matches_prefix(prefix: &str, target: &TargetName) -> bool {
        let hash = hex::encode(digest(&SHA256, target.resolved().as_bytes()));
        hash.starts_with(&prefix.to_ascii_lowercase())
    }
}
