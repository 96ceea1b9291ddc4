// Copyright Staunch Contributors.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read adapters that enforce the byte-level guarantees on fetched data: a hard size ceiling
//! and digest verification at end of stream.

use crate::error::{self, Error};
use ring::digest::{Context, SHA256};
use std::io::Read;
use url::Url;

/// A reader that verifies the SHA-256 digest of everything read once the underlying reader is
/// exhausted. The error surfaces on the read that observes end of stream.
pub(crate) struct DigestAdapter<R> {
    url: Url,
    reader: R,
    hash: Vec<u8>,
    digest: Option<Context>,
}

impl<R: Read> DigestAdapter<R> {
    pub(crate) fn sha256(reader: R, hash: &[u8], url: Url) -> Self {
        Self {
            url,
            reader,
            hash: hash.to_owned(),
            digest: Some(Context::new(&SHA256)),
        }
    }
}

impl<R: Read> Read for DigestAdapter<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let size = self.reader.read(buf)?;
        if size == 0 {
            // End of stream: finish and check the digest, exactly once.
            let Some(digest) = self.digest.take() else {
                return Ok(0);
            };
            let result = digest.finish();
            if result.as_ref() != self.hash.as_slice() {
                let err = error::HashMismatchSnafu {
                    context: self.url.to_string(),
                    calculated: hex::encode(result),
                    expected: hex::encode(&self.hash),
                }
                .build();
                return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, err));
            }
            return Ok(0);
        }

        if let Some(digest) = &mut self.digest {
            digest.update(&buf[..size]);
        }
        Ok(size)
    }
}

/// A reader that fails as soon as cumulative bytes read would exceed `max_size`. Reading
/// exactly `max_size` bytes is permitted; the check is strictly greater-than.
pub(crate) struct MaxSizeAdapter<R> {
    reader: R,
    specifier: &'static str,
    max_size: u64,
    counter: u64,
}

impl<R: Read> MaxSizeAdapter<R> {
    pub(crate) fn new(reader: R, specifier: &'static str, max_size: u64) -> Self {
        Self {
            reader,
            specifier,
            max_size,
            counter: 0,
        }
    }
}

impl<R: Read> Read for MaxSizeAdapter<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let size = self.reader.read(buf)?;
        self.counter = self.counter.saturating_add(size as u64);
        if self.counter > self.max_size {
            let err = error::MaxSizeExceededSnafu {
                max_size: self.max_size,
                specifier: self.specifier,
            }
            .build();
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, err));
        }
        Ok(size)
    }
}

/// Recovers a crate [`Error`] smuggled through `std::io::Error` by the adapters, converting
/// any other IO failure with `fallback`.
pub(crate) fn unwrap_io_error<F>(err: std::io::Error, fallback: F) -> Error
where
    F: FnOnce(std::io::Error) -> Error,
{
    match err.downcast::<Error>() {
        Ok(error) => error,
        Err(other) => fallback(other),
    }
}
