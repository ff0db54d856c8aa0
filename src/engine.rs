//! Accept/reject decisions for TLS handshakes.
//!
//! `validate` walks `CacheLookup -> {hit -> Compare} | {miss -> Fetch ->
//! VerifyAndStore -> Compare}` and ends in exactly one of `Accept` or
//! `Reject(reason)`. Every error on the way becomes a `Reject`; there is no
//! path that accepts without a pin match.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::PinCache;
use crate::clock::Clock;
use crate::config::PinningConfig;
use crate::crypto::{matches_any_pin, pin_prefix, sha256};
use crate::der;
use crate::error::Error;
use crate::events::{EventDispatcher, PinEvent};
use crate::fetcher::PinSource;
use crate::types::statement::PinStatement;
use crate::verification::cache_expiry;

/// Outcome of one validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject(Error),
}

impl Decision {
    pub fn is_accept(&self) -> bool {
        matches!(self, Decision::Accept)
    }

    pub fn into_result(self) -> Result<(), Error> {
        match self {
            Decision::Accept => Ok(()),
            Decision::Reject(e) => Err(e),
        }
    }
}

/// Hash the leaf certificate's SPKI and look for it among `pins`.
pub fn compare(cert_der: &[u8], pins: &[String]) -> Result<(), Error> {
    let spki = der::spki_span(cert_der)?;
    if matches_any_pin(&sha256(spki), pins) {
        Ok(())
    } else {
        Err(Error::HashMismatch)
    }
}

/// Pin validation state machine, shared by every handshake.
///
/// `S` is the statement source: a [`PinSource`] for [`validate`](Self::validate),
/// or with the `fetch` feature an
/// [`AsyncPinSource`](crate::fetcher::AsyncPinSource) for
/// [`validate_async`](Self::validate_async).
pub struct ValidationEngine<S: ?Sized = dyn PinSource> {
    config: Arc<PinningConfig>,
    cache: Arc<PinCache>,
    source: Arc<S>,
    events: EventDispatcher,
    clock: Arc<dyn Clock>,
}

impl<S: ?Sized> std::fmt::Debug for ValidationEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationEngine")
            .field("service_url", &self.config.service_url)
            .field("cache", &self.cache)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl<S: ?Sized> ValidationEngine<S> {
    pub fn new(
        config: Arc<PinningConfig>,
        cache: Arc<PinCache>,
        source: Arc<S>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            cache,
            source,
            events: EventDispatcher::new(),
            clock,
        }
    }

    pub fn with_events(mut self, events: EventDispatcher) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &PinningConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<PinCache> {
        &self.cache
    }

    fn cached_pins(&self, hostname: &str) -> Option<Vec<String>> {
        match self.cache.get(hostname) {
            Some(entry) => {
                self.events.emit(PinEvent::CacheHit {
                    domain: hostname.to_string(),
                });
                Some(entry.pins)
            }
            None => {
                self.events.emit(PinEvent::CacheMiss {
                    domain: hostname.to_string(),
                });
                None
            }
        }
    }

    /// Cache the verified statement under the connection hostname. A failed
    /// write does not affect this decision; the next handshake re-fetches.
    fn store(&self, hostname: &str, statement: PinStatement) -> Vec<String> {
        let expires_at = cache_expiry(&statement, self.clock.now());
        match self.cache.put(hostname, statement.pins(), expires_at) {
            Ok(()) => debug!(domain = %hostname, expires_at, "Cached pin statement"),
            Err(e) => warn!(
                domain = %hostname,
                error = %e,
                "Failed to cache pin statement, continuing with fetched pins"
            ),
        }
        statement.pins().to_vec()
    }

    fn decide(&self, hostname: &str, cert_der: &[u8], pins: Result<Vec<String>, Error>) -> Decision {
        let outcome = pins.and_then(|pins| {
            compare(cert_der, &pins).map_err(|e| {
                if e == Error::HashMismatch {
                    debug!(
                        domain = %hostname,
                        candidates = ?pins.iter().map(|p| pin_prefix(p)).collect::<Vec<_>>(),
                        "Certificate matched no pin"
                    );
                }
                e
            })
        });

        match outcome {
            Ok(()) => {
                self.events.emit(PinEvent::Success {
                    domain: hostname.to_string(),
                });
                Decision::Accept
            }
            Err(reason) => {
                self.events.emit(PinEvent::Failure {
                    domain: hostname.to_string(),
                    reason: reason.clone(),
                });
                Decision::Reject(reason)
            }
        }
    }
}

impl<S: PinSource + ?Sized> ValidationEngine<S> {
    /// Decide whether the peer presenting `cert_der` may be trusted as
    /// `hostname`. Blocks for at most the configured fetch timeout on a
    /// cache miss.
    pub fn validate(&self, hostname: &str, cert_der: &[u8]) -> Decision {
        let pins = match self.cached_pins(hostname) {
            Some(pins) => Ok(pins),
            None => self
                .source
                .fetch(hostname, self.config.include_backup_pins)
                .map(|statement| self.store(hostname, statement)),
        };
        self.decide(hostname, cert_der, pins)
    }
}

#[cfg(feature = "fetch")]
impl<S: crate::fetcher::AsyncPinSource + ?Sized> ValidationEngine<S> {
    /// Async form of [`validate`](ValidationEngine::validate).
    ///
    /// The fetch is bounded by the configured timeout. Dropping the returned
    /// future before the fetch resolves leaves the cache untouched.
    pub async fn validate_async(&self, hostname: &str, cert_der: &[u8]) -> Decision {
        let pins = match self.cached_pins(hostname) {
            Some(pins) => Ok(pins),
            None => {
                let fetch = crate::fetcher::AsyncPinSource::fetch(
                    &*self.source,
                    hostname,
                    self.config.include_backup_pins,
                );
                match tokio::time::timeout(self.config.fetch_timeout, fetch).await {
                    Ok(fetched) => fetched.map(|statement| self.store(hostname, statement)),
                    Err(_) => Err(Error::NetworkFailure(format!(
                        "pin fetch for {} timed out after {:?}",
                        hostname, self.config.fetch_timeout
                    ))),
                }
            }
        };
        self.decide(hostname, cert_der, pins)
    }
}
