// Copyright Staunch Contributors.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provides [`Decoded`], a wrapper around byte strings that remembers the exact encoded form
//! it was parsed from.
//!
//! Metadata signatures are calculated over the canonical JSON of the `signed` object, so
//! re-serializing a parsed document must reproduce it byte-for-byte. Re-encoding decoded bytes
//! does not always do that (PEM wrapping in particular is not unique), so `Decoded` keeps the
//! original string and writes it back out on serialization.

use crate::schema::error::{self, Result};
use crate::schema::spki;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use snafu::ResultExt;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;

/// A string encoding scheme that can be parsed into raw bytes.
pub trait Decode {
    /// Parse an encoded string into bytes.
    fn decode(s: &str) -> Result<Vec<u8>>;
}

/// A string encoding scheme that can represent raw bytes.
pub trait Encode {
    /// Encode bytes as a string.
    fn encode(b: &[u8]) -> String;
}

/// Lowercase hexadecimal encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hex;

impl Decode for Hex {
    fn decode(s: &str) -> Result<Vec<u8>> {
        hex::decode(s).context(error::HexDecodeSnafu { value: s })
    }
}

impl Encode for Hex {
    fn encode(b: &[u8]) -> String {
        hex::encode(b)
    }
}

/// An RSA public key, PEM-encoded as a SubjectPublicKeyInfo document. The decoded form is the
/// PKCS#1 `RSAPublicKey` structure that ring verifies against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RsaPem;

impl Decode for RsaPem {
    fn decode(s: &str) -> Result<Vec<u8>> {
        let der = pem::parse(s).context(error::PemDecodeSnafu)?;
        spki::decode(spki::ALG_ID_RSA_ENCRYPTION, der.contents())
    }
}

impl Encode for RsaPem {
    fn encode(b: &[u8]) -> String {
        pem_public_key(spki::encode(spki::ALG_ID_RSA_ENCRYPTION, b))
    }
}

/// An ECDSA public key on the P-256 curve, PEM-encoded as a SubjectPublicKeyInfo document. The
/// decoded form is the uncompressed curve point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EcdsaPem;

impl Decode for EcdsaPem {
    fn decode(s: &str) -> Result<Vec<u8>> {
        let der = pem::parse(s).context(error::PemDecodeSnafu)?;
        spki::decode(spki::ALG_ID_EC_P256, der.contents())
    }
}

impl Encode for EcdsaPem {
    fn encode(b: &[u8]) -> String {
        pem_public_key(spki::encode(spki::ALG_ID_EC_P256, b))
    }
}

fn pem_public_key(der: Vec<u8>) -> String {
    pem::encode(&pem::Pem::new("PUBLIC KEY", der))
}

/// A byte string that was parsed from an encoded string, paired with the original encoding so
/// that serialization reproduces the input exactly.
///
/// `Decoded` dereferences to `[u8]`, and equality and hashing are over the decoded bytes.
pub struct Decoded<T> {
    bytes: Vec<u8>,
    original: String,
    spooky: PhantomData<T>,
}

impl<T: Encode> From<Vec<u8>> for Decoded<T> {
    fn from(bytes: Vec<u8>) -> Self {
        let original = T::encode(&bytes);
        Self {
            bytes,
            original,
            spooky: PhantomData,
        }
    }
}

impl<T: Decode> Decoded<T> {
    /// Parse an encoded string, retaining the original form.
    pub fn decode(original: &str) -> Result<Self> {
        Ok(Self {
            bytes: T::decode(original)?,
            original: original.to_owned(),
            spooky: PhantomData,
        })
    }
}

impl<T> Decoded<T> {
    /// The decoded bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes this object and returns the decoded bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }
}

impl<T> fmt::Debug for Decoded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.original, f)
    }
}

impl<T> fmt::Display for Decoded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.original, f)
    }
}

impl<T> Clone for Decoded<T> {
    fn clone(&self) -> Self {
        Self {
            bytes: self.bytes.clone(),
            original: self.original.clone(),
            spooky: PhantomData,
        }
    }
}

impl<T> Deref for Decoded<T> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.bytes
    }
}

impl<T> AsRef<[u8]> for Decoded<T> {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl<T> PartialEq for Decoded<T> {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl<T> Eq for Decoded<T> {}

impl<T> PartialOrd for Decoded<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Decoded<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.bytes.cmp(&other.bytes)
    }
}

impl<T> Hash for Decoded<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl<'de, T: Decode> Deserialize<'de> for Decoded<T> {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let original = String::deserialize(deserializer)?;
        Self::decode(&original).map_err(serde::de::Error::custom)
    }
}

impl<T> Serialize for Decoded<T> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.original)
    }
}

#[cfg(test)]
mod tests {
    use super::{Decoded, Hex};

    #[test]
    fn hex_round_trip() {
        let decoded: Decoded<Hex> = Decoded::decode("00ff10").unwrap();
        assert_eq!(decoded.bytes(), &[0x00, 0xff, 0x10]);
        assert_eq!(decoded.to_string(), "00ff10");
    }

    #[test]
    fn hex_preserves_original_case() {
        // Uppercase hex is unusual but legal; the original form must survive.
        let decoded: Decoded<Hex> = Decoded::decode("00FF10").unwrap();
        assert_eq!(decoded.bytes(), &[0x00, 0xff, 0x10]);
        assert_eq!(serde_json::to_string(&decoded).unwrap(), "\"00FF10\"");
    }

    #[test]
    fn rejects_bad_hex() {
        assert!(Decoded::<Hex>::decode("not hex").is_err());
    }
}
