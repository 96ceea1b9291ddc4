// Copyright Staunch Contributors.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the metadata schema.

use snafu::Snafu;

/// Alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for metadata schema operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
    /// A duplicate key ID was present in a key map.
    #[snafu(display("Duplicate key ID: {}", keyid))]
    DuplicateKeyId {
        /// The duplicated key ID.
        keyid: String,
    },

    /// Unable to decode a hex-encoded string.
    #[snafu(display("Invalid hex string '{}': {}", value, source))]
    HexDecode {
        /// The string that failed to decode.
        value: String,
        /// The source of the error.
        source: hex::FromHexError,
    },

    /// A key ID in a key map did not match the ID calculated from the key itself.
    #[snafu(display("Key ID {} does not match calculated ID {}", keyid, calculated))]
    InvalidKeyId {
        /// The key ID as stated in metadata.
        keyid: String,
        /// The key ID calculated from the key's canonical form.
        calculated: String,
    },

    /// A public key document was not a well-formed SubjectPublicKeyInfo.
    #[snafu(display("Invalid SubjectPublicKeyInfo document"))]
    InvalidSpki,

    /// Failed to serialize an object as canonical JSON.
    #[snafu(display("Failed to serialize {} to JSON: {}", what, source))]
    JsonSerialization {
        /// What was being serialized.
        what: String,
        /// The source of the error.
        source: serde_json::Error,
    },

    /// Unable to parse a PEM document.
    #[snafu(display("Invalid PEM document: {}", source))]
    PemDecode {
        /// The source of the error.
        source: pem::PemError,
    },

    /// The metadata's specification version is not supported by this client.
    #[snafu(display("Unsupported metadata spec_version '{}'", spec_version))]
    SpecVersion {
        /// The spec_version string from the metadata.
        spec_version: String,
    },
}
