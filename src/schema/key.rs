// Copyright Staunch Contributors.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Public key objects as they appear in `root.json` and in targets delegations.

use crate::schema::decoded::{Decoded, EcdsaPem, Hex, RsaPem};
use crate::schema::error::{self, Result};
use olpc_cjson::CanonicalFormatter;
use ring::digest::{digest, SHA256};
use ring::signature::VerificationAlgorithm;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::ResultExt;
use std::collections::HashMap;

/// A public key, tagged with its key type as defined by the TUF specification.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "keytype")]
pub enum Key {
    /// An RSA key.
    #[serde(rename = "rsa")]
    Rsa {
        /// The RSA key.
        keyval: RsaKey,
        /// Denotes the key's signature scheme.
        scheme: RsaScheme,
        /// Any additional fields found during deserialization; these are preserved so that the
        /// enclosing document's signatures remain verifiable.
        #[serde(flatten)]
        _extra: HashMap<String, Value>,
    },
    /// An Ed25519 key.
    #[serde(rename = "ed25519")]
    Ed25519 {
        /// The Ed25519 key.
        keyval: Ed25519Key,
        /// Denotes the key's signature scheme.
        scheme: Ed25519Scheme,
        /// Any additional fields found during deserialization.
        #[serde(flatten)]
        _extra: HashMap<String, Value>,
    },
    /// An ECDSA key.
    #[serde(rename = "ecdsa-sha2-nistp256", alias = "ecdsa")]
    Ecdsa {
        /// The ECDSA key.
        keyval: EcdsaKey,
        /// Denotes the key's signature scheme.
        scheme: EcdsaScheme,
        /// Any additional fields found during deserialization.
        #[serde(flatten)]
        _extra: HashMap<String, Value>,
    },
}

/// Supported RSA signature schemes.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum RsaScheme {
    /// RSASSA-PSS with SHA-256.
    #[serde(rename = "rsassa-pss-sha256")]
    RsassaPssSha256,
}

/// An RSA public key value.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RsaKey {
    /// The public key, a PEM-encoded SubjectPublicKeyInfo document.
    pub public: Decoded<RsaPem>,

    /// Any additional fields found during deserialization.
    #[serde(flatten)]
    pub _extra: HashMap<String, Value>,
}

/// Supported Ed25519 signature schemes.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum Ed25519Scheme {
    /// Ed25519 as described in RFC 8032.
    #[serde(rename = "ed25519")]
    Ed25519,
}

/// An Ed25519 public key value.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Ed25519Key {
    /// The public key, hex-encoded.
    pub public: Decoded<Hex>,

    /// Any additional fields found during deserialization.
    #[serde(flatten)]
    pub _extra: HashMap<String, Value>,
}

/// Supported ECDSA signature schemes.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum EcdsaScheme {
    /// ECDSA on the NIST P-256 curve with SHA-256.
    #[serde(rename = "ecdsa-sha2-nistp256")]
    EcdsaSha2Nistp256,
}

/// An ECDSA public key value.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EcdsaKey {
    /// The public key, a PEM-encoded SubjectPublicKeyInfo document.
    pub public: Decoded<EcdsaPem>,

    /// Any additional fields found during deserialization.
    #[serde(flatten)]
    pub _extra: HashMap<String, Value>,
}

impl Key {
    /// Verify a signature over a message with this key. Failure to verify is not an error; it
    /// means the key did not contribute toward the signing threshold.
    pub fn verify(&self, msg: &[u8], signature: &[u8]) -> bool {
        let (alg, public): (&'static dyn VerificationAlgorithm, &[u8]) = match self {
            Key::Ed25519 {
                keyval,
                scheme: Ed25519Scheme::Ed25519,
                ..
            } => (&ring::signature::ED25519, keyval.public.bytes()),
            Key::Rsa {
                keyval,
                scheme: RsaScheme::RsassaPssSha256,
                ..
            } => (
                &ring::signature::RSA_PSS_2048_8192_SHA256,
                keyval.public.bytes(),
            ),
            Key::Ecdsa {
                keyval,
                scheme: EcdsaScheme::EcdsaSha2Nistp256,
                ..
            } => (
                &ring::signature::ECDSA_P256_SHA256_ASN1,
                keyval.public.bytes(),
            ),
        };

        ring::signature::UnparsedPublicKey::new(alg, public)
            .verify(msg, signature)
            .is_ok()
    }

    /// Calculates the key ID of this key: the SHA-256 digest of the key object's canonical JSON
    /// form.
    pub fn key_id(&self) -> Result<Decoded<Hex>> {
        let mut buf = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, CanonicalFormatter::new());
        self.serialize(&mut ser).context(error::JsonSerializationSnafu {
            what: "key".to_owned(),
        })?;
        Ok(Decoded::from(digest(&SHA256, &buf).as_ref().to_vec()))
    }
}
