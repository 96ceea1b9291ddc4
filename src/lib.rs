// Copyright Staunch Contributors.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `staunch` is a client library for repositories secured with The Update Framework (TUF).
//!
//! A TUF repository layers signed, expiring, hierarchical metadata over an otherwise untrusted
//! file mirror: the root role anchors trust, the timestamp role names the current snapshot, the
//! snapshot role pins the version of every targets metadata file, and targets roles (top-level
//! and delegated) vouch for the actual files. This crate implements the client side of that
//! scheme: it maintains a [trusted metadata set], refreshes it from a repository in the order
//! the TUF specification requires, resolves target names through the delegation graph, and
//! downloads and verifies target files.
//!
//! [trusted metadata set]: https://theupdateframework.github.io/specification/latest/#detailed-client-workflow
//!
//! # Usage
//!
//! An [`Updater`] needs a local metadata directory that already contains a trusted `root.json`
//! (obtained out of band; trusting a root is the one decision TUF cannot make for you), the
//! base URL of the repository's metadata, and a [`Transport`] to fetch bytes with.
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use staunch::{ExpirationEnforcement, FilesystemTransport, Limits, Settings, Updater};
//! use url::Url;
//!
//! let mut updater = Updater::new(
//!     Box::new(FilesystemTransport),
//!     Settings {
//!         metadata_dir: "/var/lib/example/metadata".into(),
//!         metadata_base_url: Url::parse("file:///srv/repo/metadata/")?,
//!         targets_base_url: Some(Url::parse("file:///srv/repo/targets/")?),
//!         limits: Limits::default(),
//!         expiration_enforcement: ExpirationEnforcement::Safe,
//!         prefix_targets_with_hash: true,
//!     },
//! )?;
//!
//! updater.refresh()?;
//! if let Some(info) = updater.get_target_info("file1.txt")? {
//!     updater.download_target(&info, std::path::Path::new("/tmp/file1.txt"), None)?;
//! }
//! # Ok(())
//! # }
//! ```

#![deny(rust_2018_idioms)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate
)]

mod datastore;
pub mod error;
mod fetch;
#[cfg(feature = "http")]
pub mod http;
mod io;
pub mod schema;
mod target_name;
mod transport;
pub mod trusted;

pub use crate::error::{Error, Result};
pub use crate::target_name::TargetName;
pub use crate::transport::{
    FilesystemTransport, Transport, TransportError, TransportErrorKind,
};
pub use url::Url;

use crate::datastore::Datastore;
use crate::fetch::{fetch_max_size, fetch_sha256, read_to_vec};
use crate::schema::{Role, Root, Signed, Snapshot, Target, Targets, Timestamp};
use crate::target_name::encode_filename;
use crate::trusted::{TrustedSet, TOP_LEVEL_TARGETS};
use chrono::{DateTime, Utc};
use log::debug;
use ring::digest::{digest, SHA256};
use serde_json::Value;
use snafu::{ensure, OptionExt, ResultExt};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Limits on what the client will fetch and how far it will walk, bounding the resources an
/// adversarial or broken repository can consume.
///
/// The size limits apply when the trusted metadata does not itself declare a length for the
/// file being fetched; a declared length always wins.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// The maximum size in bytes of a root metadata file.
    pub max_root_size: u64,

    /// The maximum number of root version increments accepted in a single refresh.
    pub max_root_updates: u64,

    /// The maximum size in bytes of the timestamp metadata file.
    pub max_timestamp_size: u64,

    /// The maximum size in bytes of the snapshot metadata file, when the timestamp metadata
    /// does not declare its length.
    pub max_snapshot_size: u64,

    /// The maximum size in bytes of a targets metadata file, when the snapshot metadata does
    /// not declare its length.
    pub max_targets_size: u64,

    /// The maximum number of delegated roles visited while resolving one target name.
    pub max_delegations: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_root_size: 512 * 1024,
            max_root_updates: 256,
            max_timestamp_size: 16 * 1024,
            max_snapshot_size: 2_000_000,
            max_targets_size: 5_000_000,
            max_delegations: 32,
        }
    }
}

/// Whether to fail the refresh when metadata is expired.
///
/// TUF metadata expiry is load-bearing: it is what bounds a freeze attack, where a mirror
/// replays old (correctly signed) metadata forever. Disabling enforcement is ONLY safe for
/// forensics and for inspecting repositories whose maintainers are unable to re-sign them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpirationEnforcement {
    /// Expired metadata is rejected.
    Safe,
    /// Expiry is not checked. Unsafe; see the type-level warning.
    Unsafe,
}

/// Settings for an [`Updater`].
#[derive(Debug)]
pub struct Settings {
    /// The local directory where trusted metadata is stored. Must already contain a trusted
    /// `root.json` for the repository; the client cannot bootstrap without one.
    pub metadata_dir: PathBuf,

    /// The base URL for repository metadata. Must end with a trailing slash for relative
    /// filenames to resolve under it.
    pub metadata_base_url: Url,

    /// The base URL for target files, if targets will be downloaded. Must end with a trailing
    /// slash.
    pub targets_base_url: Option<Url>,

    /// Fetch and traversal limits.
    pub limits: Limits,

    /// Whether expired metadata fails the refresh. Use [`ExpirationEnforcement::Safe`] unless
    /// you have a very good reason not to.
    pub expiration_enforcement: ExpirationEnforcement,

    /// Under a consistent-snapshot repository, whether target files are addressed as
    /// `<sha256>.<basename>`. Repositories that serve targets from immutable storage
    /// typically enable this.
    pub prefix_targets_with_hash: bool,
}

/// Authoritative information about a single target file, resolved through the delegation graph.
#[derive(Debug, Clone)]
pub struct TargetInfo {
    name: TargetName,
    target: Target,
}

impl TargetInfo {
    /// The target's name.
    pub fn name(&self) -> &TargetName {
        &self.name
    }

    /// The target file's length in bytes.
    pub fn length(&self) -> u64 {
        self.target.length
    }

    /// The target file's SHA-256 digest.
    pub fn sha256(&self) -> &[u8] {
        &self.target.hashes.sha256
    }

    /// Opaque application metadata attached to the target.
    pub fn custom(&self) -> &HashMap<String, Value> {
        &self.target.custom
    }
}

/// A TUF repository client.
///
/// One `Updater` operates sequentially on one local metadata directory: [`refresh`] walks the
/// root, timestamp, snapshot, targets update sequence against the repository, and
/// [`get_target_info`] resolves a target name through the delegation graph, fetching delegated
/// targets metadata lazily as the walk reaches it.
///
/// [`refresh`]: Updater::refresh
/// [`get_target_info`]: Updater::get_target_info
#[derive(Debug)]
pub struct Updater {
    transport: Box<dyn Transport>,
    datastore: Datastore,
    metadata_base_url: Url,
    targets_base_url: Option<Url>,
    limits: Limits,
    expiration_enforcement: ExpirationEnforcement,
    prefix_targets_with_hash: bool,
    trusted: Option<TrustedSet>,
}

impl Updater {
    /// Creates an updater from settings. No network traffic happens until [`refresh`] or
    /// [`get_target_info`] is called.
    ///
    /// [`refresh`]: Updater::refresh
    /// [`get_target_info`]: Updater::get_target_info
    pub fn new(transport: Box<dyn Transport>, settings: Settings) -> Result<Self> {
        Ok(Self {
            transport,
            datastore: Datastore::new(Some(settings.metadata_dir))?,
            metadata_base_url: settings.metadata_base_url,
            targets_base_url: settings.targets_base_url,
            limits: settings.limits,
            expiration_enforcement: settings.expiration_enforcement,
            prefix_targets_with_hash: settings.prefix_targets_with_hash,
            trusted: None,
        })
    }

    /// Refreshes the trusted metadata set from the repository, using the current system time
    /// as the reference instant for expiry checks.
    pub fn refresh(&mut self) -> Result<()> {
        self.refresh_at(Utc::now())
    }

    /// Refreshes the trusted metadata set from the repository, using `reference_time` for
    /// every expiry check in this refresh.
    ///
    /// The sequence follows the TUF client workflow: load the locally trusted root, walk the
    /// chain of newer root versions published by the repository, then update timestamp,
    /// snapshot, and top-level targets metadata, persisting each accepted document to the
    /// local metadata directory. Delegated targets metadata is not fetched here; it is loaded
    /// lazily during target resolution.
    pub fn refresh_at(&mut self, reference_time: DateTime<Utc>) -> Result<()> {
        let root_bytes = self
            .datastore
            .bytes("root.json")?
            .context(error::LocalRootMissingSnafu)?;
        let mut trusted = TrustedSet::new(
            &root_bytes,
            reference_time,
            self.expiration_enforcement,
        )?;

        self.update_root_chain(&mut trusted)?;
        if self.expiration_enforcement == ExpirationEnforcement::Safe {
            ensure!(
                !trusted.root().signed.is_expired(reference_time),
                error::ExpiredMetadataSnafu { role: "root" }
            );
        }
        self.load_timestamp(&mut trusted)?;
        self.load_snapshot(&mut trusted)?;
        self.load_role_targets(&mut trusted, TOP_LEVEL_TARGETS, "root")?;

        self.trusted = Some(trusted);
        Ok(())
    }

    /// Walks `<N>.root.json` files starting just past the trusted version. The chain ends at
    /// the first version the repository cannot produce (or produces garbage for); a
    /// well-formed successor that fails verification is an error, not the end of the chain.
    fn update_root_chain(&self, trusted: &mut TrustedSet) -> Result<()> {
        let start = trusted.root().signed.version.get() + 1;
        for version in start..start + self.limits.max_root_updates {
            let url = join_url(&self.metadata_base_url, &format!("{version}.root.json"))?;
            let bytes = match fetch_max_size(
                self.transport.as_ref(),
                url.clone(),
                self.limits.max_root_size,
                "max_root_size argument",
            )
            .and_then(|reader| read_to_vec(reader, &url))
            {
                Ok(bytes) => bytes,
                Err(Error::Transport { source, .. }) => {
                    debug!("root chain ended at version {version}: {source}");
                    break;
                }
                Err(e) => return Err(e),
            };

            match trusted.update_root(&bytes) {
                Ok(()) => self.datastore.create("root.json", &bytes)?,
                Err(e @ (Error::ParseMetadata { .. } | Error::WrongMetadataType { .. })) => {
                    debug!("root chain ended at version {version}: {e}");
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Loads timestamp metadata: the locally stored document first (best effort, to establish
    /// a version floor for rollback detection), then always the repository's, since the
    /// timestamp role exists to be re-fetched. An equal-version answer from the repository
    /// means "nothing new" and leaves the stored file untouched.
    fn load_timestamp(&self, trusted: &mut TrustedSet) -> Result<()> {
        if let Some(bytes) = self.datastore.bytes("timestamp.json")? {
            if let Err(e) = trusted.update_timestamp(&bytes) {
                debug!("stored timestamp.json rejected: {e}");
                self.datastore.remove("timestamp.json")?;
            }
        }

        let url = join_url(&self.metadata_base_url, "timestamp.json")?;
        let reader = fetch_max_size(
            self.transport.as_ref(),
            url.clone(),
            self.limits.max_timestamp_size,
            "max_timestamp_size argument",
        )?;
        let bytes = read_to_vec(reader, &url)?;
        match trusted.update_timestamp(&bytes) {
            Ok(()) => self.datastore.create("timestamp.json", &bytes)?,
            Err(Error::EqualVersion { .. }) => {
                debug!("timestamp.json is unchanged");
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Loads snapshot metadata: the locally stored document if it still satisfies the
    /// timestamp metadata, otherwise the repository's.
    fn load_snapshot(&self, trusted: &mut TrustedSet) -> Result<()> {
        if let Some(bytes) = self.datastore.bytes("snapshot.json")? {
            match trusted.update_snapshot(&bytes, true) {
                Ok(()) => {
                    debug!("stored snapshot.json is up to date");
                    return Ok(());
                }
                Err(e) => {
                    debug!("stored snapshot.json rejected: {e}");
                    self.datastore.remove("snapshot.json")?;
                }
            }
        }

        let timestamp = trusted
            .timestamp()
            .context(error::MissingTrustedRoleSnafu { role: "timestamp" })?;
        let meta = timestamp
            .signed
            .snapshot_meta()
            .context(error::MetaMissingSnafu {
                file: "snapshot.json",
                role: "timestamp",
            })?;
        let version = meta.version.get();
        let (max_size, specifier) = match meta.length {
            Some(length) => (length, "snapshot length declared by timestamp.json"),
            None => (self.limits.max_snapshot_size, "max_snapshot_size argument"),
        };
        let filename = if trusted.root().signed.consistent_snapshot {
            format!("{version}.snapshot.json")
        } else {
            "snapshot.json".to_owned()
        };

        let url = join_url(&self.metadata_base_url, &filename)?;
        let reader = fetch_max_size(self.transport.as_ref(), url.clone(), max_size, specifier)?;
        let bytes = read_to_vec(reader, &url)?;
        trusted.update_snapshot(&bytes, false)?;
        self.datastore.create("snapshot.json", &bytes)?;
        Ok(())
    }

    /// Loads targets metadata for one role (top-level or delegated): the locally stored
    /// document if it still satisfies the snapshot metadata, otherwise the repository's.
    fn load_role_targets(
        &self,
        trusted: &mut TrustedSet,
        role_name: &str,
        parent_name: &str,
    ) -> Result<()> {
        let stored = format!("{}.json", encode_filename(role_name));
        if let Some(bytes) = self.datastore.bytes(&stored)? {
            match trusted.update_delegated_targets(&bytes, role_name, parent_name) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    debug!("stored {stored} rejected: {e}");
                    self.datastore.remove(&stored)?;
                }
            }
        }

        let snapshot = trusted
            .snapshot()
            .context(error::MissingTrustedRoleSnafu { role: "snapshot" })?;
        let meta = snapshot
            .signed
            .role_meta(role_name)
            .context(error::MetaMissingSnafu {
                file: format!("{role_name}.json"),
                role: "snapshot",
            })?;
        let version = meta.version.get();
        let (max_size, specifier) = match meta.length {
            Some(length) => (length, "targets length declared by snapshot.json"),
            None => (self.limits.max_targets_size, "max_targets_size argument"),
        };
        let filename = if trusted.root().signed.consistent_snapshot {
            format!("{version}.{}.json", encode_filename(role_name))
        } else {
            format!("{}.json", encode_filename(role_name))
        };

        let url = join_url(&self.metadata_base_url, &filename)?;
        let reader = fetch_max_size(self.transport.as_ref(), url.clone(), max_size, specifier)?;
        let bytes = read_to_vec(reader, &url)?;
        trusted.update_delegated_targets(&bytes, role_name, parent_name)?;
        self.datastore.create(&stored, &bytes)?;
        Ok(())
    }

    /// Resolves authoritative information about a target, refreshing the trusted metadata set
    /// first if this updater has not refreshed yet.
    ///
    /// Returns `Ok(None)` when no trusted role vouches for the target.
    pub fn get_target_info(&mut self, target_name: &str) -> Result<Option<TargetInfo>> {
        let name = TargetName::new(target_name)?;
        let refreshed = self
            .trusted
            .as_ref()
            .is_some_and(|trusted| trusted.targets_by_name(TOP_LEVEL_TARGETS).is_some());
        if !refreshed {
            self.refresh()?;
        }

        // The trusted set is moved out while the walk runs so that delegated metadata can be
        // loaded into it without aliasing `self`.
        let mut trusted = self
            .trusted
            .take()
            .context(error::MissingTrustedRoleSnafu { role: "targets" })?;
        let result = self.find_target(&mut trusted, &name);
        self.trusted = Some(trusted);
        result
    }

    /// Preorder depth-first walk of the delegation graph.
    ///
    /// The first role that lists the target wins; roles already visited are skipped, so cycles
    /// on the wire cannot loop the walk; and at most `max_delegations` roles are visited. When
    /// a matching delegation is terminating, the roles that were still queued are abandoned:
    /// neither later siblings nor previously queued subtrees may answer for the target.
    fn find_target(
        &self,
        trusted: &mut TrustedSet,
        name: &TargetName,
    ) -> Result<Option<TargetInfo>> {
        let mut to_visit: Vec<(String, String)> =
            vec![(TOP_LEVEL_TARGETS.to_owned(), "root".to_owned())];
        let mut visited: HashSet<String> = HashSet::new();

        while (visited.len() as u64) < self.limits.max_delegations {
            let Some((role_name, parent_name)) = to_visit.pop() else {
                break;
            };
            if visited.contains(&role_name) {
                continue;
            }

            if trusted.targets_by_name(&role_name).is_none() {
                self.load_role_targets(trusted, &role_name, &parent_name)?;
            }
            let targets = trusted
                .targets_by_name(&role_name)
                .context(error::MissingTrustedRoleSnafu {
                    role: role_name.as_str(),
                })?;

            if let Some(target) = targets.signed.target(name) {
                debug!("target '{name}' found in role '{role_name}'");
                return Ok(Some(TargetInfo {
                    name: name.clone(),
                    target: target.clone(),
                }));
            }
            visited.insert(role_name.clone());

            if let Some(delegations) = &targets.signed.delegations {
                let mut children = Vec::new();
                let mut terminated = false;
                for role in &delegations.roles {
                    if role.matches_target(name) {
                        children.push((role.name.clone(), role_name.clone()));
                        if role.terminating {
                            terminated = true;
                            break;
                        }
                    }
                }
                if terminated {
                    debug!("terminating delegation in '{role_name}' ends the walk for '{name}'");
                    to_visit.clear();
                }
                // Reversed, so the stack pops children in their declared order.
                to_visit.extend(children.into_iter().rev());
            }
        }
        Ok(None)
    }

    /// Downloads a target file, verifies its length and declared hashes, and writes it to
    /// `outpath`.
    ///
    /// `targets_base_url` overrides the base URL from [`Settings`]; omitting both is an error.
    /// Under a consistent-snapshot repository with hash prefixing enabled, the file is fetched
    /// as `<dir>/<sha256>.<basename>`.
    pub fn download_target(
        &self,
        info: &TargetInfo,
        outpath: &Path,
        targets_base_url: Option<&Url>,
    ) -> Result<()> {
        let trusted = self
            .trusted
            .as_ref()
            .context(error::MissingTrustedRoleSnafu { role: "targets" })?;
        let base = targets_base_url
            .or(self.targets_base_url.as_ref())
            .context(error::MissingTargetsBaseUrlSnafu)?;

        let resolved = info.name().resolved();
        let filename = if trusted.root().signed.consistent_snapshot && self.prefix_targets_with_hash
        {
            let sha256 = hex::encode(info.sha256());
            match resolved.rsplit_once('/') {
                Some((dir, basename)) => format!("{dir}/{sha256}.{basename}"),
                None => format!("{sha256}.{resolved}"),
            }
        } else {
            resolved.to_owned()
        };

        let url = join_url(base, &filename)?;
        let reader = fetch_sha256(
            self.transport.as_ref(),
            url.clone(),
            info.length(),
            "target length from targets metadata",
            info.sha256(),
        )?;
        let bytes = read_to_vec(reader, &url)?;
        ensure!(
            bytes.len() as u64 == info.length(),
            error::LengthMismatchSnafu {
                context: url.to_string(),
                found: bytes.len() as u64,
                expected: info.length(),
            }
        );

        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent)
                .context(error::CacheFileWriteSnafu { path: parent })?;
        }
        std::fs::write(outpath, &bytes).context(error::CacheFileWriteSnafu { path: outpath })?;
        Ok(())
    }

    /// Checks whether `path` already holds the exact file `info` describes. Returns the path
    /// when the stored bytes match the descriptor's length and hash; any failure (missing
    /// file, wrong size, wrong digest) simply means "not cached".
    pub fn find_cached_target(&self, info: &TargetInfo, path: &Path) -> Option<PathBuf> {
        let bytes = std::fs::read(path).ok()?;
        if bytes.len() as u64 != info.length() {
            return None;
        }
        let calculated = digest(&SHA256, &bytes);
        (calculated.as_ref() == info.sha256()).then(|| path.to_path_buf())
    }

    /// The trusted root metadata, if this updater has refreshed.
    pub fn root(&self) -> Option<&Signed<Root>> {
        self.trusted.as_ref().map(TrustedSet::root)
    }

    /// The trusted timestamp metadata, if this updater has refreshed.
    pub fn timestamp(&self) -> Option<&Signed<Timestamp>> {
        self.trusted.as_ref().and_then(TrustedSet::timestamp)
    }

    /// The trusted snapshot metadata, if this updater has refreshed.
    pub fn snapshot(&self) -> Option<&Signed<Snapshot>> {
        self.trusted.as_ref().and_then(TrustedSet::snapshot)
    }

    /// The trusted targets metadata for a role name (`"targets"` for the top-level role), if
    /// it has been loaded.
    pub fn targets_by_name(&self, role_name: &str) -> Option<&Signed<Targets>> {
        self.trusted
            .as_ref()
            .and_then(|trusted| trusted.targets_by_name(role_name))
    }
}

fn join_url(base: &Url, path: &str) -> Result<Url> {
    base.join(path).context(error::JoinUrlSnafu {
        path,
        url: base.clone(),
    })
}
