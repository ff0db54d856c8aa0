//! `rustls` integration.
//!
//! [`PinningCertVerifier`] wraps an ordinary chain verifier. The chain is
//! checked first; only a certificate the wrapped verifier accepts is then
//! run through the pin engine. A pin rejection surfaces to rustls as a
//! generic application verification failure; the precise reason goes to the
//! engine's event sinks.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, DigitallySignedStruct, SignatureScheme};
use tracing::debug;

use crate::engine::{Decision, ValidationEngine};

#[derive(Debug)]
pub struct PinningCertVerifier {
    inner: Arc<dyn ServerCertVerifier>,
    engine: Arc<ValidationEngine>,
}

impl PinningCertVerifier {
    pub fn new(inner: Arc<dyn ServerCertVerifier>, engine: Arc<ValidationEngine>) -> Self {
        Self { inner, engine }
    }
}

fn hostname(server_name: &ServerName<'_>) -> Option<String> {
    match server_name {
        ServerName::DnsName(name) => Some(name.as_ref().to_string()),
        ServerName::IpAddress(ip) => Some(std::net::IpAddr::from(*ip).to_string()),
        _ => None,
    }
}

impl ServerCertVerifier for PinningCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let verified = self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        )?;

        let Some(host) = hostname(server_name) else {
            debug!("Unsupported server name type, rejecting");
            return Err(rustls::Error::InvalidCertificate(
                CertificateError::ApplicationVerificationFailure,
            ));
        };

        match self.engine.validate(&host, end_entity.as_ref()) {
            Decision::Accept => Ok(verified),
            Decision::Reject(_) => Err(rustls::Error::InvalidCertificate(
                CertificateError::ApplicationVerificationFailure,
            )),
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}
