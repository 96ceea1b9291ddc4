// Copyright Staunch Contributors.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Minimal DER handling for SubjectPublicKeyInfo documents.
//!
//! TUF metadata carries RSA and ECDSA public keys as PEM-wrapped SPKI documents, while ring
//! expects the raw key material inside the SPKI bit string. These helpers unwrap and rewrap
//! that structure without pulling in a full ASN.1 stack.

use crate::schema::error::{self, Result};
use snafu::OptionExt;

const TAG_SEQUENCE: u8 = 0x30;
const TAG_BIT_STRING: u8 = 0x03;

/// DER contents of the AlgorithmIdentifier sequence for rsaEncryption (OID 1.2.840.113549.1.1.1
/// with NULL parameters).
pub(super) const ALG_ID_RSA_ENCRYPTION: &[u8] = &[
    0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01, 0x05, 0x00,
];

/// DER contents of the AlgorithmIdentifier sequence for id-ecPublicKey (OID 1.2.840.10045.2.1)
/// over prime256v1 (OID 1.2.840.10045.3.1.7).
pub(super) const ALG_ID_EC_P256: &[u8] = &[
    0x06, 0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01, 0x06, 0x08, 0x2a, 0x86, 0x48, 0xce,
    0x3d, 0x03, 0x01, 0x07,
];

/// Extracts the subject public key bits from an SPKI document, requiring the stated algorithm.
pub(super) fn decode(algorithm_id: &[u8], der: &[u8]) -> Result<Vec<u8>> {
    parse(algorithm_id, der).context(error::InvalidSpkiSnafu)
}

fn parse(algorithm_id: &[u8], der: &[u8]) -> Option<Vec<u8>> {
    untrusted::Input::from(der)
        .read_all(untrusted::EndOfInput, |r| {
            let spki = read_tlv(r, TAG_SEQUENCE)?;
            spki.read_all(untrusted::EndOfInput, |r| {
                let algorithm = read_tlv(r, TAG_SEQUENCE)?;
                if algorithm.as_slice_less_safe() != algorithm_id {
                    return Err(untrusted::EndOfInput);
                }
                let bit_string = read_tlv(r, TAG_BIT_STRING)?;
                bit_string.read_all(untrusted::EndOfInput, |r| {
                    // The leading octet counts unused bits; key material is octet-aligned.
                    if r.read_byte()? != 0 {
                        return Err(untrusted::EndOfInput);
                    }
                    Ok(r.read_bytes_to_end().as_slice_less_safe().to_vec())
                })
            })
        })
        .ok()
}

fn read_tlv<'a>(
    r: &mut untrusted::Reader<'a>,
    tag: u8,
) -> std::result::Result<untrusted::Input<'a>, untrusted::EndOfInput> {
    if r.read_byte()? != tag {
        return Err(untrusted::EndOfInput);
    }
    let first = r.read_byte()?;
    let length = if first & 0x80 == 0 {
        usize::from(first)
    } else {
        let octets = usize::from(first & 0x7f);
        if octets == 0 || octets > 2 {
            return Err(untrusted::EndOfInput);
        }
        let mut length = 0usize;
        for _ in 0..octets {
            length = (length << 8) | usize::from(r.read_byte()?);
        }
        length
    };
    r.read_bytes(length)
}

/// Wraps subject public key bits in an SPKI document with the stated algorithm.
pub(super) fn encode(algorithm_id: &[u8], key_bits: &[u8]) -> Vec<u8> {
    let mut bit_string_contents = Vec::with_capacity(key_bits.len() + 1);
    bit_string_contents.push(0);
    bit_string_contents.extend_from_slice(key_bits);

    let mut spki_contents = write_tlv(TAG_SEQUENCE, algorithm_id);
    spki_contents.extend(write_tlv(TAG_BIT_STRING, &bit_string_contents));
    write_tlv(TAG_SEQUENCE, &spki_contents)
}

fn write_tlv(tag: u8, contents: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(contents.len() + 4);
    out.push(tag);
    let length = contents.len();
    if length < 0x80 {
        out.push(length as u8);
    } else if length <= 0xff {
        out.push(0x81);
        out.push(length as u8);
    } else {
        out.push(0x82);
        out.push((length >> 8) as u8);
        out.push((length & 0xff) as u8);
    }
    out.extend_from_slice(contents);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_ec_point() {
        let point = vec![0x04; 65];
        let spki = encode(ALG_ID_EC_P256, &point);
        assert_eq!(decode(ALG_ID_EC_P256, &spki).unwrap(), point);
    }

    #[test]
    fn rejects_wrong_algorithm() {
        let spki = encode(ALG_ID_EC_P256, &[0x04; 65]);
        assert!(decode(ALG_ID_RSA_ENCRYPTION, &spki).is_err());
    }

    #[test]
    fn rejects_truncated_document() {
        let spki = encode(ALG_ID_EC_P256, &[0x04; 65]);
        assert!(decode(ALG_ID_EC_P256, &spki[..spki.len() - 1]).is_err());
    }
}
