// Copyright Staunch Contributors.
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::error::{self, Result};
use log::debug;
use snafu::ResultExt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tempfile::{NamedTempFile, TempDir};

/// `Datastore` persists trusted metadata files to the local metadata directory.
///
/// Writes are atomic: a file is serialized to a temporary file in the same directory and
/// renamed over the destination, so a reader (or a crashed writer) never observes a partially
/// written file.
#[derive(Debug, Clone)]
pub(crate) struct Datastore {
    path_lock: Arc<RwLock<DatastorePath>>,
}

impl Datastore {
    pub(crate) fn new(path: Option<PathBuf>) -> Result<Self> {
        Ok(Self {
            path_lock: Arc::new(RwLock::new(match path {
                None => DatastorePath::TempDir(TempDir::new().context(error::DatastoreInitSnafu)?),
                Some(p) => DatastorePath::Path(p),
            })),
        })
    }

    // The lock protects the path, not the underlying files; a poisoned lock still holds a
    // valid path.

    fn read(&self) -> RwLockReadGuard<'_, DatastorePath> {
        self.path_lock
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, DatastorePath> {
        self.path_lock
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Reads a file in the datastore fully into memory, or `None` if the file does not exist.
    pub(crate) fn bytes(&self, file: &str) -> Result<Option<Vec<u8>>> {
        let path = self.read().path().join(file);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) => match err.kind() {
                ErrorKind::NotFound => Ok(None),
                _ => Err(err).context(error::DatastoreOpenSnafu { path: &path }),
            },
        }
    }

    /// Writes a metadata file into the datastore atomically. The stored bytes are exactly the
    /// bytes that were verified, so signatures remain checkable against the stored form.
    pub(crate) fn create(&self, file: &str, bytes: &[u8]) -> Result<()> {
        let dir = self.write();
        let path = dir.path().join(file);
        debug!("persisting '{}'", path.display());
        let mut temp = NamedTempFile::new_in(dir.path())
            .context(error::DatastoreCreateSnafu { path: &path })?;
        temp.write_all(bytes)
            .context(error::DatastoreCreateSnafu { path: &path })?;
        temp.flush()
            .context(error::DatastoreCreateSnafu { path: &path })?;
        temp.persist(&path)
            .context(error::DatastorePersistSnafu { path })?;
        Ok(())
    }

    /// Deletes a file from the datastore. Missing files are not an error.
    pub(crate) fn remove(&self, file: &str) -> Result<()> {
        let path = self.write().path().join(file);
        debug!("removing '{}'", path.display());
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) => match err.kind() {
                ErrorKind::NotFound => Ok(()),
                _ => Err(err).context(error::DatastoreRemoveSnafu { path: &path }),
            },
        }
    }
}

/// Holds either a user-managed directory or a `TempDir` owned on the user's behalf;
/// `TempDir` is an RAII object, so it must be kept alive for as long as the datastore.
#[derive(Debug)]
enum DatastorePath {
    /// Path to a user-managed directory.
    Path(PathBuf),
    /// A `TempDir` created on the user's behalf.
    TempDir(TempDir),
}

impl DatastorePath {
    fn path(&self) -> &Path {
        match self {
            DatastorePath::Path(p) => p,
            DatastorePath::TempDir(t) => t.path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Datastore;

    #[test]
    fn create_then_read_back() {
        let datastore = Datastore::new(None).unwrap();
        datastore
            .create("timestamp.json", br#"{"version": 1}"#)
            .unwrap();
        let bytes = datastore.bytes("timestamp.json").unwrap().unwrap();
        assert_eq!(bytes, br#"{"version": 1}"#);
    }

    #[test]
    fn missing_file_reads_as_none() {
        let datastore = Datastore::new(None).unwrap();
        assert!(datastore.bytes("nope.json").unwrap().is_none());
    }

    #[test]
    fn replace_is_atomic_no_leftover_temp() {
        let dir = tempfile::tempdir().unwrap();
        let datastore = Datastore::new(Some(dir.path().to_path_buf())).unwrap();
        datastore.create("root.json", br#"{"version": 1}"#).unwrap();
        datastore.create("root.json", br#"{"version": 2}"#).unwrap();

        // Only the destination file remains after the rename.
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("root.json")]);

        let bytes = datastore.bytes("root.json").unwrap().unwrap();
        assert_eq!(bytes, br#"{"version": 2}"#);
    }

    #[test]
    fn remove_is_idempotent() {
        let datastore = Datastore::new(None).unwrap();
        datastore.create("snapshot.json", b"{}").unwrap();
        datastore.remove("snapshot.json").unwrap();
        datastore.remove("snapshot.json").unwrap();
        assert!(datastore.bytes("snapshot.json").unwrap().is_none());
    }
}
