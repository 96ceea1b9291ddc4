// Copyright Staunch Contributors.
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::error::{self, Error, Result};
use crate::io::{unwrap_io_error, DigestAdapter, MaxSizeAdapter};
use crate::transport::{Transport, TransportError, TransportErrorKind};
use snafu::ResultExt;
use std::io::Read;
use url::Url;

/// Opens a bounded reader for `url`: the transfer is aborted the moment it would exceed
/// `max_size` bytes. `specifier` names the source of the limit for error messages.
pub(crate) fn fetch_max_size(
    transport: &dyn Transport,
    url: Url,
    max_size: u64,
    specifier: &'static str,
) -> Result<impl Read> {
    let reader = transport
        .fetch(url.clone())
        .context(error::TransportSnafu { url })?;
    Ok(MaxSizeAdapter::new(reader, specifier, max_size))
}

/// Opens a bounded reader for `url` that additionally verifies the SHA-256 digest of the
/// transferred bytes at end of stream.
pub(crate) fn fetch_sha256(
    transport: &dyn Transport,
    url: Url,
    size: u64,
    specifier: &'static str,
    sha256: &[u8],
) -> Result<impl Read> {
    let reader = fetch_max_size(transport, url.clone(), size, specifier)?;
    Ok(DigestAdapter::sha256(reader, sha256, url))
}

/// Drains a fetched reader into memory, restoring size-limit and digest errors smuggled
/// through the IO layer by the adapters.
pub(crate) fn read_to_vec<R: Read>(mut reader: R, url: &Url) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).map_err(|e| {
        unwrap_io_error(e, |io_err| Error::Transport {
            url: url.clone(),
            source: TransportError::new(TransportErrorKind::Other, url, io_err),
        })
    })?;
    Ok(buf)
}
