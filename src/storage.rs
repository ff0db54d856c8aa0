//! Backing stores for the pin cache.
//!
//! The platform's secure storage is an external collaborator; this module
//! defines the contract it has to meet and ships an in-memory store and a
//! directory-backed store.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tempfile::NamedTempFile;

use crate::crypto::sha256;
use crate::error::Error;

/// Keyed byte storage with platform-managed protection at rest.
///
/// A failed `get` is treated by callers as "absent", never as a reason to
/// trust anything.
pub trait SecureStorage: Send + Sync {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), Error>;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error>;

    fn delete(&self, key: &str) -> Result<(), Error>;

    /// Remove every entry. Stores that cannot enumerate keys may leave this
    /// as a no-op; the cache deletes the keys it knows about first.
    fn clear(&self) -> Result<(), Error> {
        Ok(())
    }
}

/// Process-local storage, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl SecureStorage for MemoryStorage {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), Error> {
        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<(), Error> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), Error> {
        self.entries.write().clear();
        Ok(())
    }
}

/// One file per key under a directory.
///
/// File names are the hex SHA-256 of the key, so every hostname maps to a
/// fixed-length name inside the directory. Each write goes to its own
/// temporary file, which is then renamed into place.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

const RECORD_EXTENSION: &str = "pin";

impl FileStorage {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn new(dir: &Path) -> Result<Self, Error> {
        fs::create_dir_all(dir).map_err(storage_error)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir
            .join(hex::encode(sha256(key.as_bytes())))
            .with_extension(RECORD_EXTENSION)
    }
}

fn storage_error(err: io::Error) -> Error {
    Error::StorageUnavailable(err.to_string())
}

impl SecureStorage for FileStorage {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), Error> {
        let mut temp = NamedTempFile::new_in(&self.dir).map_err(storage_error)?;
        temp.write_all(value).map_err(storage_error)?;
        temp.persist(self.path_for(key))
            .map(|_| ())
            .map_err(|e| storage_error(e.error))
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        match fs::read(self.path_for(key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error(e)),
        }
    }

    fn delete(&self, key: &str) -> Result<(), Error> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error(e)),
        }
    }

    fn clear(&self) -> Result<(), Error> {
        for entry in fs::read_dir(&self.dir).map_err(storage_error)? {
            let path = entry.map_err(storage_error)?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION) {
                fs::remove_file(&path).map_err(storage_error)?;
            }
        }
        Ok(())
    }
}
