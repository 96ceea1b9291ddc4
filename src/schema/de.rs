// Copyright Staunch Contributors.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deserialization helpers that enforce schema invariants at parse time.

use crate::schema::decoded::{Decoded, Hex};
use crate::schema::error;
use crate::schema::key::Key;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use snafu::ensure;
use std::collections::HashMap;
use std::fmt;

/// Deserializes a key map, failing if any key ID does not match the ID calculated from its key,
/// or if a key ID appears twice.
pub(super) fn deserialize_keys<'de, D>(
    deserializer: D,
) -> Result<HashMap<Decoded<Hex>, Key>, D::Error>
where
    D: Deserializer<'de>,
{
    fn validate_and_insert_entry(
        keyid: Decoded<Hex>,
        key: Key,
        map: &mut HashMap<Decoded<Hex>, Key>,
    ) -> Result<(), error::Error> {
        let calculated = key.key_id()?;
        let keyid_hex = hex::encode(&keyid);
        ensure!(
            keyid == calculated,
            error::InvalidKeyIdSnafu {
                keyid: keyid_hex,
                calculated: hex::encode(&calculated),
            }
        );
        ensure!(
            map.insert(keyid, key).is_none(),
            error::DuplicateKeyIdSnafu {
                keyid: hex::encode(&calculated)
            }
        );
        Ok(())
    }

    struct Visitor;

    impl<'de> serde::de::Visitor<'de> for Visitor {
        type Value = HashMap<Decoded<Hex>, Key>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a map of key IDs to keys")
        }

        fn visit_map<M>(self, mut access: M) -> Result<Self::Value, M::Error>
        where
            M: serde::de::MapAccess<'de>,
        {
            let mut map = HashMap::new();
            while let Some((keyid, key)) = access.next_entry()? {
                validate_and_insert_entry(keyid, key, &mut map).map_err(M::Error::custom)?;
            }
            Ok(map)
        }
    }

    deserializer.deserialize_map(Visitor)
}

/// Deserializes the flattened unrecognized-field bag of a role, dropping the `_type` tag that
/// serde's internally tagged representation leaves behind.
pub(super) fn extra_skip_type<'de, D>(deserializer: D) -> Result<HashMap<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let mut extra: HashMap<String, Value> = HashMap::deserialize(deserializer)?;
    extra.remove("_type");
    Ok(extra)
}

/// Deserializes and validates a `spec_version` string. The version must have two or three dotted
/// numeric components and its major component must be `1`; minor and patch differences are
/// accepted.
pub(super) fn spec_version<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let spec_version = String::deserialize(deserializer)?;
    if supported_spec_version(&spec_version) {
        Ok(spec_version)
    } else {
        Err(D::Error::custom(
            error::SpecVersionSnafu { spec_version }.build(),
        ))
    }
}

fn supported_spec_version(spec_version: &str) -> bool {
    let components: Vec<&str> = spec_version.split('.').collect();
    if components.len() < 2 || components.len() > 3 {
        return false;
    }
    if !components
        .iter()
        .all(|component| component.parse::<u64>().is_ok())
    {
        return false;
    }
    components[0].parse() == Ok(1u64)
}
