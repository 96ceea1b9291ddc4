// Copyright Staunch Contributors.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Safe handling of target path names.
//!
//! Target names are repository-relative POSIX-style paths supplied by metadata or by callers.
//! They may contain `.` and `..` segments, which we resolve up front; a name that would escape
//! the repository root is refused. Filenames derived from names are percent-encoded so that a
//! name containing `/` cannot traverse out of a local directory.

use crate::error::{self, Result};
use percent_encoding::{percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use snafu::ensure;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Everything except unreserved URL characters is escaped when a target or role name becomes a
/// filename.
const FILENAME_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'.')
    .remove(b'-')
    .remove(b'_')
    .remove(b'~');

/// The name of a target file as listed in targets metadata.
///
/// The original wire form is retained for serialization; identity (equality, hashing, path
/// matching) uses the resolved form.
#[derive(Debug, Clone)]
pub struct TargetName {
    raw: String,
    resolved: String,
}

impl TargetName {
    /// Creates a `TargetName`, resolving dot segments and rejecting names that escape the
    /// repository root.
    pub fn new<S: Into<String>>(raw: S) -> Result<Self> {
        let raw = raw.into();
        let resolved = resolve(&raw)?;
        Ok(Self { raw, resolved })
    }

    /// The name exactly as it appeared on the wire or was given by the caller.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The name with `.` and `..` segments and redundant separators resolved away.
    pub fn resolved(&self) -> &str {
        &self.resolved
    }
}

/// Resolves dot segments the way a web server resolves them in a URL path, without consulting
/// the filesystem.
fn resolve(raw: &str) -> Result<String> {
    ensure!(!raw.is_empty(), error::SafeTargetPathSnafu { name: raw });
    let mut segments: Vec<&str> = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                ensure!(
                    segments.pop().is_some(),
                    error::SafeTargetPathSnafu { name: raw }
                );
            }
            other => segments.push(other),
        }
    }
    ensure!(!segments.is_empty(), error::SafeTargetPathSnafu { name: raw });
    Ok(segments.join("/"))
}

impl fmt::Display for TargetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.resolved, f)
    }
}

impl PartialEq for TargetName {
    fn eq(&self, other: &Self) -> bool {
        self.resolved == other.resolved
    }
}

impl Eq for TargetName {}

impl Hash for TargetName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.resolved.hash(state);
    }
}

impl Serialize for TargetName {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for TargetName {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        TargetName::new(raw).map_err(serde::de::Error::custom)
    }
}

/// Percent-encodes a target or role name for use as a single filename or URL path segment.
pub(crate) fn encode_filename<S: AsRef<str>>(name: S) -> String {
    percent_encode(name.as_ref().as_bytes(), FILENAME_ESCAPE).to_string()
}

#[cfg(test)]
mod tests {
    use super::{encode_filename, TargetName};

    #[test]
    fn resolves_dot_segments() {
        assert_eq!(TargetName::new("a/./b").unwrap().resolved(), "a/b");
        assert_eq!(TargetName::new("a/x/../b").unwrap().resolved(), "a/b");
        assert_eq!(TargetName::new("./file1.txt").unwrap().resolved(), "file1.txt");
        assert_eq!(TargetName::new("a//b").unwrap().resolved(), "a/b");
    }

    #[test]
    fn preserves_raw_form() {
        let name = TargetName::new("./file1.txt").unwrap();
        assert_eq!(name.raw(), "./file1.txt");
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"./file1.txt\"");
    }

    #[test]
    fn equality_is_over_resolved_names() {
        assert_eq!(
            TargetName::new("./file1.txt").unwrap(),
            TargetName::new("file1.txt").unwrap()
        );
    }

    #[test]
    fn rejects_escapes() {
        assert!(TargetName::new("../evil").is_err());
        assert!(TargetName::new("a/../../evil").is_err());
        assert!(TargetName::new("").is_err());
        assert!(TargetName::new("/").is_err());
    }

    #[test]
    fn filenames_cannot_traverse() {
        assert_eq!(encode_filename("a/b"), "a%2Fb");
        assert_eq!(encode_filename("role name"), "role%20name");
        assert_eq!(encode_filename("plain-role_1.json"), "plain-role_1.json");
    }
}
