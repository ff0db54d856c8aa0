//! Retrieval of signed pin statements.
//!
//! The HTTP exchange itself is delegated to a transport; [`PinFetcher`] owns
//! everything after the bytes arrive: status check, decoding, signature and
//! freshness verification, and the domain check.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use url::Url;

use crate::canonicalize;
use crate::clock::Clock;
use crate::config::PinningConfig;
use crate::crypto::{pin_prefix, SignatureVerifier};
use crate::domain::is_wildcard;
use crate::error::Error;
use crate::types::statement::PinStatement;
use crate::verification::{check_domain, verify_statement};

/// One GET against the pin-statement service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub base_url: String,
    pub domain: String,
    pub include_backup_pins: bool,
    pub timeout: Duration,
}

impl FetchRequest {
    /// `<base>?domain=<domain>[&include-backup-pins=true]`, keeping any query
    /// the base URL already carries.
    pub fn url(&self) -> Result<Url, Error> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            Error::DecodingFailed(format!("Invalid service URL '{}': {}", self.base_url, e))
        })?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("domain", &self.domain);
            if self.include_backup_pins {
                query.append_pair("include-backup-pins", "true");
            }
        }
        Ok(url)
    }
}

/// Status and body of a completed GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Performs the GET. Implementations send `Accept: application/json`, do not
/// follow redirects, and give up after `request.timeout`.
pub trait HttpTransport: Send + Sync {
    fn get(&self, request: &FetchRequest) -> Result<HttpResponse, Error>;
}

/// Anything that can produce a verified statement for a domain.
pub trait PinSource: Send + Sync {
    fn fetch(&self, domain: &str, include_backup_pins: bool) -> Result<PinStatement, Error>;
}

pub struct PinFetcher<T> {
    transport: T,
    config: Arc<PinningConfig>,
    verifier: SignatureVerifier,
    clock: Arc<dyn Clock>,
}

impl<T> std::fmt::Debug for PinFetcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinFetcher")
            .field("service_url", &self.config.service_url)
            .field("verifier", &self.verifier)
            .finish_non_exhaustive()
    }
}

impl<T> PinFetcher<T> {
    /// # Errors
    ///
    /// Fails if `config` does not validate.
    pub fn new(transport: T, config: Arc<PinningConfig>, clock: Arc<dyn Clock>) -> Result<Self, Error> {
        let verifier = config.validate()?;
        Ok(Self {
            transport,
            config,
            verifier,
            clock,
        })
    }

    pub fn config(&self) -> &PinningConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn request(&self, domain: &str, include_backup_pins: bool) -> FetchRequest {
        FetchRequest {
            base_url: self.config.service_url.clone(),
            domain: domain.to_string(),
            include_backup_pins,
            timeout: self.config.fetch_timeout,
        }
    }

    fn accept_response(&self, domain: &str, response: HttpResponse) -> Result<PinStatement, Error> {
        if !(200..300).contains(&response.status) {
            warn!(domain = %domain, status = response.status, "Pin service returned error status");
            return Err(Error::InvalidStatusCode(response.status));
        }

        let signed = canonicalize::decode(&response.body, self.config.profile)?;
        let statement = verify_statement(signed, &self.verifier, &self.config, self.clock.now())?;
        check_domain(&statement, domain)?;

        debug!(
            domain = %domain,
            pattern = %statement.domain(),
            wildcard = is_wildcard(statement.domain()),
            pins = statement.pins().len(),
            primary = %statement.pins().first().map(|p| pin_prefix(p)).unwrap_or_default(),
            expires_at = statement.expires_at(),
            "Fetched pin statement"
        );
        Ok(statement)
    }
}

impl<T: HttpTransport> PinSource for PinFetcher<T> {
    fn fetch(&self, domain: &str, include_backup_pins: bool) -> Result<PinStatement, Error> {
        let request = self.request(domain, include_backup_pins);
        let response = self.transport.get(&request)?;
        self.accept_response(domain, response)
    }
}

// ---------------------------------------------------------------------------
// Async path (fetch-gated)
// ---------------------------------------------------------------------------

/// Async counterpart of [`HttpTransport`].
#[cfg(feature = "fetch")]
#[async_trait::async_trait]
pub trait AsyncHttpTransport: Send + Sync {
    async fn get(&self, request: &FetchRequest) -> Result<HttpResponse, Error>;
}

/// Async counterpart of [`PinSource`]. Dropping the future aborts the fetch.
#[cfg(feature = "fetch")]
#[async_trait::async_trait]
pub trait AsyncPinSource: Send + Sync {
    async fn fetch(&self, domain: &str, include_backup_pins: bool) -> Result<PinStatement, Error>;
}

#[cfg(feature = "fetch")]
#[async_trait::async_trait]
impl<T: AsyncHttpTransport> AsyncPinSource for PinFetcher<T> {
    async fn fetch(&self, domain: &str, include_backup_pins: bool) -> Result<PinStatement, Error> {
        let request = self.request(domain, include_backup_pins);
        let response = self.transport.get(&request).await?;
        self.accept_response(domain, response)
    }
}

#[cfg(feature = "fetch")]
fn network_error(url: &Url, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::NetworkFailure(format!("Timed out fetching {}", url))
    } else {
        Error::NetworkFailure(format!("Failed to fetch {}: {}", url, err))
    }
}

/// `reqwest`-backed async transport.
#[cfg(feature = "fetch")]
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

#[cfg(feature = "fetch")]
impl ReqwestTransport {
    pub fn new() -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::NetworkFailure(e.to_string()))?;
        Ok(Self { client })
    }
}

#[cfg(feature = "fetch")]
#[async_trait::async_trait]
impl AsyncHttpTransport for ReqwestTransport {
    async fn get(&self, request: &FetchRequest) -> Result<HttpResponse, Error> {
        let url = request.url()?;
        let resp = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| network_error(&url, e))?;

        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(|e| network_error(&url, e))?;
        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// `reqwest`-backed blocking transport. Must not be used from inside an
/// async runtime.
#[cfg(feature = "fetch")]
#[derive(Debug, Clone)]
pub struct BlockingReqwestTransport {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "fetch")]
impl BlockingReqwestTransport {
    pub fn new() -> Result<Self, Error> {
        let client = reqwest::blocking::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::NetworkFailure(e.to_string()))?;
        Ok(Self { client })
    }
}

#[cfg(feature = "fetch")]
impl HttpTransport for BlockingReqwestTransport {
    fn get(&self, request: &FetchRequest) -> Result<HttpResponse, Error> {
        let url = request.url()?;
        let resp = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(request.timeout)
            .send()
            .map_err(|e| network_error(&url, e))?;

        let status = resp.status().as_u16();
        let body = resp.bytes().map_err(|e| network_error(&url, e))?;
        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}
