//! Caller-owned pinning configuration.
//!
//! The application builds one [`PinningConfig`], validates it, and shares it
//! (usually behind an `Arc`) with the fetcher and the validation engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::canonicalize::WireProfile;
use crate::crypto::{Algorithm, PublicKeyMaterial, SignatureVerifier};
use crate::error::Error;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);
pub const DEFAULT_RETRY_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinningConfig {
    /// Base URL of the pin-statement service.
    pub service_url: String,

    /// Key the service signs statements with.
    pub public_key: PublicKeyMaterial,

    pub algorithm: Algorithm,

    /// Response shape and canonical layout.
    #[serde(default)]
    pub profile: WireProfile,

    /// When set, statements naming another key id are rejected.
    #[serde(default)]
    pub key_id: Option<String>,

    #[serde(default = "default_true")]
    pub include_backup_pins: bool,

    #[serde(default = "default_fetch_timeout", with = "duration_secs")]
    pub fetch_timeout: Duration,

    /// How far in the future `issued_at` may be.
    #[serde(default = "default_clock_skew", with = "duration_secs")]
    pub clock_skew_tolerance: Duration,

    /// Logical requests tracked by the retry ledger.
    #[serde(default = "default_retry_capacity")]
    pub retry_capacity: usize,
}

fn default_true() -> bool {
    true
}

fn default_fetch_timeout() -> Duration {
    DEFAULT_FETCH_TIMEOUT
}

fn default_clock_skew() -> Duration {
    DEFAULT_CLOCK_SKEW
}

fn default_retry_capacity() -> usize {
    DEFAULT_RETRY_CAPACITY
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

impl PinningConfig {
    /// Configuration for the primary profile: flat records signed with
    /// ECDSA P-256.
    pub fn new(service_url: impl Into<String>, public_key: PublicKeyMaterial) -> Self {
        Self {
            service_url: service_url.into(),
            public_key,
            algorithm: Algorithm::EcdsaP256Sha256,
            profile: WireProfile::FlatRecord,
            key_id: None,
            include_backup_pins: true,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            clock_skew_tolerance: DEFAULT_CLOCK_SKEW,
            retry_capacity: DEFAULT_RETRY_CAPACITY,
        }
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_profile(mut self, profile: WireProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    pub fn without_backup_pins(mut self) -> Self {
        self.include_backup_pins = false;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_clock_skew_tolerance(mut self, tolerance: Duration) -> Self {
        self.clock_skew_tolerance = tolerance;
        self
    }

    pub fn with_retry_capacity(mut self, capacity: usize) -> Self {
        self.retry_capacity = capacity;
        self
    }

    /// Check the configuration and build the statement verifier it implies.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidPublicKey`] if the key does not parse for the chosen
    /// algorithm, [`Error::DecodingFailed`] for an unusable URL or timeout.
    pub fn validate(&self) -> Result<SignatureVerifier, Error> {
        let url = Url::parse(&self.service_url).map_err(|e| {
            Error::DecodingFailed(format!("Invalid service_url '{}': {}", self.service_url, e))
        })?;
        if !matches!(url.scheme(), "https" | "http") {
            return Err(Error::DecodingFailed(format!(
                "service_url must be an http(s) URL, got scheme '{}'",
                url.scheme()
            )));
        }
        if self.fetch_timeout.is_zero() {
            return Err(Error::DecodingFailed("fetch_timeout must be non-zero".to_string()));
        }
        if self.retry_capacity == 0 {
            return Err(Error::DecodingFailed("retry_capacity must be non-zero".to_string()));
        }
        SignatureVerifier::new(self.algorithm, &self.public_key)
    }

    /// Clock-skew tolerance in whole seconds.
    pub fn skew_seconds(&self) -> i64 {
        i64::try_from(self.clock_skew_tolerance.as_secs()).unwrap_or(i64::MAX)
    }
}
