// Copyright Staunch Contributors.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The transport seam: how repository files are obtained, abstracted away from what is done
//! with them.

use dyn_clone::DynClone;
use log::trace;
use snafu::Snafu;
use std::fmt::Debug;
use std::io::{ErrorKind, Read};
use std::path::PathBuf;
use url::Url;

/// A trait to abstract over the method/protocol by which repository files are obtained.
///
/// The returned reader streams the file's bytes; callers wrap it with size and digest checks.
pub trait Transport: Debug + DynClone {
    /// Opens a reader for the file specified by `url`.
    fn fetch(&self, url: Url) -> Result<Box<dyn Read + Send>, TransportError>;
}

// Implement `Clone` for `Transport` trait objects.
dyn_clone::clone_trait_object!(Transport);

/// The kind of error a [`Transport`] experienced during `fetch`.
///
/// `FileNotFound` is distinguished because the update workflow depends on it: the root rotation
/// loop walks successive root versions until one is not available.
#[derive(Debug, Copy, Clone)]
#[non_exhaustive]
pub enum TransportErrorKind {
    /// The transport does not handle the URL's scheme, e.g. `file://` or `http://`.
    UnsupportedUrlScheme,
    /// The file cannot be found.
    FileNotFound,
    /// The transport failed for any other reason, e.g. IO error, HTTP broken pipe, etc.
    Other,
}

/// The error type that [`Transport::fetch`] returns.
#[derive(Debug, Snafu)]
#[snafu(display("Transport '{}' fetch failed: {}", url, source))]
#[snafu(visibility(pub))]
pub struct TransportError {
    /// The kind of error that occurred.
    pub kind: TransportErrorKind,
    /// The URL that the transport was trying to fetch.
    pub url: String,
    /// The underlying error that occurred.
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl TransportError {
    /// Creates a new [`TransportError`].
    pub fn new<S, E>(kind: TransportErrorKind, url: S, source: E) -> Self
    where
        S: AsRef<str>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind,
            url: url.as_ref().into(),
            source: source.into(),
        }
    }

    /// Creates a [`TransportError`] reporting an unhandled URL scheme.
    pub fn unsupported_scheme<S: AsRef<str>>(url: S) -> Self {
        TransportError::new(
            TransportErrorKind::UnsupportedUrlScheme,
            url,
            "transport cannot handle the given URL scheme".to_string(),
        )
    }

    /// Whether the underlying failure was that the file does not exist.
    pub fn is_file_not_found(&self) -> bool {
        matches!(self.kind, TransportErrorKind::FileNotFound)
    }
}

// =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=

/// Provides a [`Transport`] for local files, used for `file://` repositories and in tests.
#[derive(Debug, Clone, Copy)]
pub struct FilesystemTransport;

impl Transport for FilesystemTransport {
    fn fetch(&self, url: Url) -> Result<Box<dyn Read + Send>, TransportError> {
        if url.scheme() != "file" {
            return Err(TransportError::unsupported_scheme(url));
        }

        let path = file_url_path(&url);
        trace!("fetching '{}'", path.display());
        let f = std::fs::File::open(path).map_err(|e| {
            let kind = match e.kind() {
                ErrorKind::NotFound => TransportErrorKind::FileNotFound,
                _ => TransportErrorKind::Other,
            };
            TransportError::new(kind, url, e)
        })?;
        Ok(Box::new(f))
    }
}

/// Returns the path component of a file URL as a filesystem path.
///
/// `Url::to_file_path` percent-decodes, which could reintroduce path traversal characters that
/// were deliberately escaped; the encoded path is used as-is instead.
#[cfg(unix)]
fn file_url_path(url: &Url) -> PathBuf {
    PathBuf::from(url.path())
}

/// Returns the path component of a file URL as a filesystem path.
///
/// Windows file URLs carry a leading `/` before the drive letter, which must be stripped.
#[cfg(windows)]
fn file_url_path(url: &Url) -> PathBuf {
    let path = url.path();
    PathBuf::from(path.strip_prefix('/').unwrap_or(path))
}
