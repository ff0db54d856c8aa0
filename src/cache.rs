//! TTL-bounded cache of verified pin sets.
//!
//! Entries live in a [`SecureStorage`] backend with an in-memory index in
//! front of it. Expiry is enforced lazily: reading a stale entry deletes it
//! and reports a miss. The index sits behind a reader-writer lock; every
//! write holds the lock across the backend write, so readers never observe a
//! key whose index and backend disagree mid-update.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::Error;
use crate::storage::{MemoryStorage, SecureStorage};
use crate::types::cache::CachedPinEntry;

pub struct PinCache {
    storage: Arc<dyn SecureStorage>,
    clock: Arc<dyn Clock>,
    index: RwLock<HashMap<String, CachedPinEntry>>,
}

impl std::fmt::Debug for PinCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinCache")
            .field("indexed", &self.index.read().len())
            .finish_non_exhaustive()
    }
}

impl PinCache {
    pub fn new(storage: Arc<dyn SecureStorage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            index: RwLock::new(HashMap::new()),
        }
    }

    /// A cache backed only by process memory.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::new(Arc::new(MemoryStorage::new()), clock)
    }

    /// Look up the live entry for `domain`.
    ///
    /// Stale, unreadable and malformed records are all reported as `None`;
    /// stale and malformed ones are deleted on the way.
    pub fn get(&self, domain: &str) -> Option<CachedPinEntry> {
        let now = self.clock.now();

        {
            let index = self.index.read();
            if let Some(entry) = index.get(domain) {
                if !entry.is_expired(now) {
                    return Some(entry.clone());
                }
            }
        }

        let mut index = self.index.write();
        if let Some(entry) = index.get(domain) {
            // Re-check: a writer may have replaced the entry since the read.
            if !entry.is_expired(now) {
                return Some(entry.clone());
            }
            debug!(domain = %domain, expires_at = entry.expires_at, "Pin cache entry expired");
            index.remove(domain);
            self.delete_from_storage(domain);
            return None;
        }

        let entry = self.load(domain)?;
        if entry.is_expired(now) {
            debug!(domain = %domain, expires_at = entry.expires_at, "Stored pin entry expired");
            self.delete_from_storage(domain);
            return None;
        }

        index.insert(domain.to_string(), entry.clone());
        Some(entry)
    }

    /// Store `pins` for `domain` until `expires_at`, replacing any previous
    /// entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the backend write fails; the
    /// key is then absent from the cache.
    pub fn put(&self, domain: &str, pins: &[String], expires_at: i64) -> Result<(), Error> {
        let entry = CachedPinEntry {
            domain: domain.to_string(),
            pins: pins.to_vec(),
            expires_at,
        };
        let record = serde_json::to_vec(&entry)
            .map_err(|e| Error::StorageUnavailable(format!("cannot encode record: {}", e)))?;

        let mut index = self.index.write();
        if let Err(e) = self.storage.put(domain, &record) {
            index.remove(domain);
            return Err(e);
        }
        index.insert(domain.to_string(), entry);
        Ok(())
    }

    /// Remove `domain` from the cache.
    pub fn delete(&self, domain: &str) -> Result<(), Error> {
        let mut index = self.index.write();
        index.remove(domain);
        self.storage.delete(domain)
    }

    /// Remove every entry.
    pub fn clear(&self) -> Result<(), Error> {
        let mut index = self.index.write();
        let mut first_err = None;
        for domain in index.keys() {
            if let Err(e) = self.storage.delete(domain) {
                first_err.get_or_insert(e);
            }
        }
        index.clear();
        if let Err(e) = self.storage.clear() {
            first_err.get_or_insert(e);
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Read and decode the stored record for `domain`.
    fn load(&self, domain: &str) -> Option<CachedPinEntry> {
        let bytes = match self.storage.get(domain) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(domain = %domain, error = %e, "Pin storage read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_slice::<CachedPinEntry>(&bytes) {
            Ok(entry) if entry.domain == domain && !entry.pins.is_empty() => Some(entry),
            Ok(_) => {
                warn!(domain = %domain, "Stored pin record does not belong to this key, discarding");
                self.delete_from_storage(domain);
                None
            }
            Err(e) => {
                warn!(domain = %domain, error = %e, "Stored pin record is corrupt, discarding");
                self.delete_from_storage(domain);
                None
            }
        }
    }

    fn delete_from_storage(&self, domain: &str) {
        if let Err(e) = self.storage.delete(domain) {
            warn!(domain = %domain, error = %e, "Failed to delete pin record");
        }
    }
}
