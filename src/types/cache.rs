use serde::{Deserialize, Serialize};

/// A verified pin set as held by the pin cache, keyed by the literal
/// hostname that was connected to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedPinEntry {
    pub domain: String,
    pub pins: Vec<String>,
    /// Unix seconds; the entry is stale once `now >= expires_at`.
    pub expires_at: i64,
}

impl CachedPinEntry {
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}
