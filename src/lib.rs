//! # dynpin
//!
//! Dynamic TLS certificate pinning driven by signed pin statements.
//!
//! Instead of compiling certificate hashes into the client, the pins for a
//! host are fetched from a signing service as a signed statement, verified
//! against a key the client already trusts, cached for the statement's TTL,
//! and compared against the SPKI of the leaf certificate presented in each
//! TLS handshake. Every failure along the way rejects the connection.
//!
//! ## Features
//!
//! - **SPKI extraction**: Minimal DER walk to the leaf's SubjectPublicKeyInfo
//! - **Statement verification**: ECDSA P-256/SHA-256 and Ed25519 over canonical JSON
//! - **Two wire profiles**: Flat signed records and compact three-part tokens
//! - **TTL cache**: Lazily expired, lock-protected, over pluggable secure storage
//! - **Wildcards**: `*.example.com` covers exactly one extra label
//! - **Fail-closed engine**: Accept only on a pin match, with observability events
//! - **Retry decorator**: At most one cache-bypassing retry per logical request
//! - **`fetch` feature**: `reqwest` transports and an async validation path
//! - **`rustls` feature**: A `ServerCertVerifier` that enforces pins
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use dynpin::{
//!     Algorithm, Decision, Error, FetchRequest, HttpResponse, HttpTransport, PinCache,
//!     PinFetcher, PinningConfig, PublicKeyMaterial, SystemClock, ValidationEngine,
//! };
//!
//! struct Unavailable;
//!
//! impl HttpTransport for Unavailable {
//!     fn get(&self, _request: &FetchRequest) -> Result<HttpResponse, Error> {
//!         Ok(HttpResponse { status: 503, body: Vec::new() })
//!     }
//! }
//!
//! // Ed25519 base point, standing in for the service's signing key.
//! let mut key = vec![0x66u8; 32];
//! key[0] = 0x58;
//!
//! let config = Arc::new(
//!     PinningConfig::new("https://pins.example.net/v1/pins", PublicKeyMaterial::Raw(key))
//!         .with_algorithm(Algorithm::Ed25519),
//! );
//! let clock = Arc::new(SystemClock);
//! let fetcher = PinFetcher::new(Unavailable, config.clone(), clock.clone())?;
//! let cache = Arc::new(PinCache::in_memory(clock.clone()));
//! let engine = ValidationEngine::new(config, cache, Arc::new(fetcher), clock);
//!
//! // No statement can be fetched, so the handshake is refused.
//! let decision = engine.validate("api.example.com", b"leaf certificate DER");
//! assert_eq!(decision, Decision::Reject(Error::InvalidStatusCode(503)));
//! # Ok::<(), Error>(())
//! ```
//!
//! ## Error Handling
//!
//! Fallible operations return `Result<T, Error>`. [`Error`] mirrors the
//! failure taxonomy one-to-one and [`Error::code`] gives a stable code for
//! each kind. At the engine boundary every error becomes
//! [`Decision::Reject`].

pub mod cache;
pub mod canonicalize;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod der;
pub mod domain;
pub mod engine;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod retry;
pub mod storage;
#[cfg(feature = "rustls")]
pub mod tls;
pub mod types;
pub mod verification;

#[cfg(test)]
mod test_support;

pub use cache::PinCache;
pub use canonicalize::WireProfile;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::PinningConfig;
pub use crypto::{Algorithm, PublicKeyMaterial, SignatureVerifier};
pub use engine::{Decision, ValidationEngine};
pub use error::{Error, ErrorCode};
pub use events::{EventDispatcher, EventSink, PinEvent, RecordingSink};
pub use fetcher::{FetchRequest, HttpResponse, HttpTransport, PinFetcher, PinSource};
#[cfg(feature = "fetch")]
pub use fetcher::{AsyncHttpTransport, AsyncPinSource, BlockingReqwestTransport, ReqwestTransport};
pub use retry::{PinRetry, RetryLedger};
pub use storage::{FileStorage, MemoryStorage, SecureStorage};
#[cfg(feature = "rustls")]
pub use tls::PinningCertVerifier;
pub use types::cache::CachedPinEntry;
pub use types::statement::{PinStatement, StatementFields};
