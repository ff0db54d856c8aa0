//! One cache-bypassing retry per logical request.
//!
//! When a connection fails because its pins were rejected, the pins may
//! simply be stale. [`PinRetry`] evicts the host's cache entry and runs the
//! request once more. A [`RetryLedger`] remembers which logical requests
//! (keyed `"METHOD URL"`) have already used their retry, so a persistently
//! failing request cannot loop.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::cache::PinCache;
use crate::engine::Decision;
use crate::error::Error;

/// Errors that may be cured by re-fetching pins.
pub trait PinRejection {
    fn is_pin_rejection(&self) -> bool;
}

impl PinRejection for Error {
    fn is_pin_rejection(&self) -> bool {
        matches!(self, Error::HashMismatch)
    }
}

impl PinRejection for Decision {
    fn is_pin_rejection(&self) -> bool {
        matches!(self, Decision::Reject(e) if e.is_pin_rejection())
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    order: VecDeque<String>,
    keys: HashSet<String>,
}

/// Bounded set of request keys that have already been retried. When full,
/// the oldest key is forgotten.
#[derive(Debug)]
pub struct RetryLedger {
    capacity: usize,
    state: RwLock<LedgerState>,
}

impl RetryLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: RwLock::new(LedgerState::default()),
        }
    }

    pub fn request_key(method: &str, url: &str) -> String {
        format!("{} {}", method.to_ascii_uppercase(), url)
    }

    pub fn has_retried(&self, key: &str) -> bool {
        self.state.read().keys.contains(key)
    }

    /// Record a retry for `key`. Returns `false` if it was already recorded.
    pub fn mark(&self, key: &str) -> bool {
        let mut state = self.state.write();
        if state.keys.contains(key) {
            return false;
        }
        if state.order.len() >= self.capacity {
            if let Some(oldest) = state.order.pop_front() {
                state.keys.remove(&oldest);
            }
        }
        state.order.push_back(key.to_string());
        state.keys.insert(key.to_string());
        true
    }

    pub fn forget(&self, key: &str) {
        let mut state = self.state.write();
        if state.keys.remove(key) {
            state.order.retain(|k| k != key);
        }
    }

    pub fn len(&self) -> usize {
        self.state.read().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Retry decorator around a connection attempt. The validation engine is
/// unaware of it.
#[derive(Debug)]
pub struct PinRetry {
    cache: Arc<PinCache>,
    ledger: RetryLedger,
}

impl PinRetry {
    pub fn new(cache: Arc<PinCache>, capacity: usize) -> Self {
        Self {
            cache,
            ledger: RetryLedger::new(capacity),
        }
    }

    pub fn ledger(&self) -> &RetryLedger {
        &self.ledger
    }

    /// Run `attempt`; if it fails with a pin rejection and this request has
    /// not been retried yet, evict `hostname` from the cache and run it once
    /// more.
    ///
    /// A successful retry clears the request's ledger entry. A failed retry
    /// leaves it in place, so re-issuing the same request fails without
    /// another re-fetch.
    pub fn execute<T, E, F>(&self, method: &str, url: &str, hostname: &str, mut attempt: F) -> Result<T, E>
    where
        E: PinRejection + std::fmt::Display,
        F: FnMut() -> Result<T, E>,
    {
        let err = match attempt() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_pin_rejection() => e,
            Err(e) => return Err(e),
        };

        let key = RetryLedger::request_key(method, url);
        if !self.ledger.mark(&key) {
            warn!(request = %key, error = %err, "Pin rejection after retry already used");
            return Err(err);
        }

        info!(request = %key, domain = %hostname, error = %err, "Pin rejection, refreshing pins and retrying once");
        if let Err(e) = self.cache.delete(hostname) {
            warn!(domain = %hostname, error = %e, "Failed to evict pins before retry");
        }

        let result = attempt();
        if result.is_ok() {
            self.ledger.forget(&key);
        }
        result
    }
}
