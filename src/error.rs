// Copyright Staunch Contributors.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the client.
//!
//! Variants group into the failure kinds a caller needs to tell apart: malformed metadata,
//! unmet signature thresholds, version regressions, expiry, length/hash mismatches, transport
//! failures, missing repository entries, persistence failures, and API misuse. `EqualVersion`
//! is a non-fatal signal: the update workflow absorbs it during timestamp refresh.

use crate::transport::TransportError;
use snafu::Snafu;
use std::path::PathBuf;
use url::Url;

/// Alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for this crate.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
    /// A file could not be written to the local target directory.
    #[snafu(display("Failed to write target to '{}': {}", path.display(), source))]
    CacheFileWrite {
        /// The path that could not be written.
        path: PathBuf,
        /// The source of the error.
        source: std::io::Error,
    },

    /// The local metadata directory could not be initialized.
    #[snafu(display("Failed to initialize datastore: {}", source))]
    DatastoreInit {
        /// The source of the error.
        source: std::io::Error,
    },

    /// A metadata file could not be created in the local metadata directory.
    #[snafu(display("Failed to create metadata file '{}': {}", path.display(), source))]
    DatastoreCreate {
        /// The path that could not be created.
        path: PathBuf,
        /// The source of the error.
        source: std::io::Error,
    },

    /// A metadata file could not be opened from the local metadata directory.
    #[snafu(display("Failed to open metadata file '{}': {}", path.display(), source))]
    DatastoreOpen {
        /// The path that could not be opened.
        path: PathBuf,
        /// The source of the error.
        source: std::io::Error,
    },

    /// A metadata file could not be moved into place atomically.
    #[snafu(display("Failed to persist metadata file '{}': {}", path.display(), source))]
    DatastorePersist {
        /// The destination path.
        path: PathBuf,
        /// The source of the error.
        source: tempfile::PersistError,
    },

    /// A metadata file could not be removed from the local metadata directory.
    #[snafu(display("Failed to remove metadata file '{}': {}", path.display(), source))]
    DatastoreRemove {
        /// The path that could not be removed.
        path: PathBuf,
        /// The source of the error.
        source: std::io::Error,
    },

    /// A role listed the same key ID more than once.
    #[snafu(display("Key {} is listed more than once for role '{}'", keyid, role))]
    DuplicateKeyId {
        /// The repeated key ID, hex-encoded.
        keyid: String,
        /// The role whose keyids list repeats the key.
        role: String,
    },

    /// A role's definition was not found in its delegating parent.
    #[snafu(display("Role '{}' is not delegated by '{}'", name, parent))]
    DelegationMissing {
        /// The delegated role name.
        name: String,
        /// The parent role that was expected to delegate it.
        parent: String,
    },

    /// A metadata update supplied the same version that is already trusted. Non-fatal: the
    /// update workflow treats it as "nothing to do".
    #[snafu(display("{} metadata version {} is already trusted", role, version))]
    EqualVersion {
        /// The role that was being updated.
        role: String,
        /// The version that is already trusted.
        version: u64,
    },

    /// Metadata was expired at the reference time.
    #[snafu(display("{} metadata is expired", role))]
    ExpiredMetadata {
        /// The expired role.
        role: String,
    },

    /// A file's contents did not match the hash declared for it.
    #[snafu(display(
        "Hash mismatch for {}: calculated {}, expected {}",
        context,
        calculated,
        expected
    ))]
    HashMismatch {
        /// What was being verified.
        context: String,
        /// The calculated digest, hex-encoded.
        calculated: String,
        /// The expected digest, hex-encoded.
        expected: String,
    },

    /// Failed to join a path onto a base URL.
    #[snafu(display("Failed to join '{}' to URL '{}': {}", path, url, source))]
    JoinUrl {
        /// The path being joined.
        path: String,
        /// The base URL.
        url: Url,
        /// The source of the error.
        source: url::ParseError,
    },

    /// A key ID named by a role was not present in the applicable key map.
    #[snafu(display("Key {} for role '{}' is not in the key map", keyid, role))]
    KeyMissing {
        /// The missing key's ID, hex-encoded.
        keyid: String,
        /// The role whose keyids list named the key.
        role: String,
    },

    /// A file's length did not match the length declared for it.
    #[snafu(display(
        "Length mismatch for {}: found {}, expected {}",
        context,
        found,
        expected
    ))]
    LengthMismatch {
        /// What was being verified.
        context: String,
        /// The actual length in bytes.
        found: u64,
        /// The expected length in bytes.
        expected: u64,
    },

    /// No trusted root metadata was found in the local metadata directory. The client cannot
    /// bootstrap without one.
    #[snafu(display("No trusted root metadata in the local metadata directory"))]
    LocalRootMissing,

    /// A download exceeded its size limit and was aborted.
    #[snafu(display("Download exceeded the maximum size of {} bytes ({})", max_size, specifier))]
    MaxSizeExceeded {
        /// The limit that was exceeded.
        max_size: u64,
        /// Where the limit came from.
        specifier: &'static str,
    },

    /// A metadata file expected to be described by the timestamp or snapshot metadata was not.
    #[snafu(display("{} metadata has no entry for '{}'", role, file))]
    MetaMissing {
        /// The file that was expected to be described.
        file: String,
        /// The describing role.
        role: String,
    },

    /// An operation required a role that the trusted set has not accepted yet.
    #[snafu(display("Cannot proceed without trusted {} metadata", role))]
    MissingTrustedRole {
        /// The missing role.
        role: String,
    },

    /// A target download was requested but no targets base URL is configured.
    #[snafu(display("No targets base URL was configured"))]
    MissingTargetsBaseUrl,

    /// A metadata update supplied an older version than is already trusted.
    #[snafu(display(
        "{} metadata version rolled back: trusted version {}, new version {}",
        role,
        current_version,
        new_version
    ))]
    OlderMetadata {
        /// The role that was being updated.
        role: String,
        /// The currently trusted version.
        current_version: u64,
        /// The older version that was offered.
        new_version: u64,
    },

    /// Metadata failed to parse.
    #[snafu(display("Failed to parse {} metadata: {}", role, source))]
    ParseMetadata {
        /// The role being parsed.
        role: String,
        /// The source of the error.
        source: serde_json::Error,
    },

    /// A root metadata update was attempted after snapshot metadata was already accepted.
    /// Root rotation must complete before the rest of the refresh proceeds.
    #[snafu(display("Cannot update root metadata after snapshot metadata has been accepted"))]
    RootUpdateAfterSnapshot,

    /// A role was not declared in the root metadata.
    #[snafu(display("Role '{}' is not declared in root metadata", role))]
    RoleMissing {
        /// The undeclared role.
        role: String,
    },

    /// A target name would escape the repository root.
    #[snafu(display("Unsafe target name '{}'", name))]
    SafeTargetPath {
        /// The offending name.
        name: String,
    },

    /// A schema-level operation failed.
    #[snafu(display("Metadata schema error: {}", source))]
    Schema {
        /// The source of the error.
        source: crate::schema::Error,
    },

    /// Metadata did not carry enough valid signatures to meet its role's threshold.
    #[snafu(display(
        "{} metadata has {} valid signature(s) of the {} required",
        role,
        valid,
        threshold
    ))]
    SignatureThreshold {
        /// The role whose threshold was not met.
        role: String,
        /// The number of distinct keys with valid signatures.
        valid: u64,
        /// The required threshold.
        threshold: u64,
    },

    /// A transport failed to fetch a file.
    #[snafu(display("Failed to fetch '{}': {}", url, source))]
    Transport {
        /// The URL being fetched.
        url: Url,
        /// The source of the error.
        source: TransportError,
    },

    /// A root metadata update did not carry the successor version number.
    #[snafu(display(
        "Root metadata version jumped: expected version {}, found {}",
        expected,
        found
    ))]
    UnexpectedRootVersion {
        /// The required version (current + 1).
        expected: u64,
        /// The version found in the new metadata.
        found: u64,
    },

    /// Metadata did not carry the exact version declared for it by its describing role.
    #[snafu(display(
        "{} metadata version {} does not match the declared version {}",
        role,
        found,
        expected
    ))]
    VersionMismatch {
        /// The role being updated.
        role: String,
        /// The version declared by the describing metadata.
        expected: u64,
        /// The version found in the new metadata.
        found: u64,
    },

    /// Metadata declared a different role type than the one being parsed.
    #[snafu(display(
        "Expected {} metadata but the document declares type '{}'",
        expected,
        found
    ))]
    WrongMetadataType {
        /// The role being parsed.
        expected: String,
        /// The `_type` value found in the document.
        found: String,
    },
}
