use crate::config::PinningConfig;
use crate::crypto::{Algorithm, SignatureVerifier};
use crate::domain;
use crate::error::Error;
use crate::types::statement::{PinStatement, SignedStatement};

/// Authenticate a decoded statement and apply the freshness policy.
///
/// Runs in this order, failing on the first problem:
/// 1. The statement's `alg` names the configured algorithm
/// 2. A configured key id matches the statement's, when it carries one
/// 3. The signature covers the signed bytes
/// 4. `issued_at <= expires_at`
/// 5. `issued_at` is not beyond `now` plus the skew tolerance
/// 6. `expires_at` is still in the future
/// 7. At least one pin and a non-negative TTL
///
/// The domain is checked separately by [`check_domain`], since only the
/// caller knows which host was requested.
pub fn verify_statement(
    signed: SignedStatement,
    verifier: &SignatureVerifier,
    config: &PinningConfig,
    now: i64,
) -> Result<PinStatement, Error> {
    let fields = &signed.fields;

    // Step 1: algorithm agreement
    let claimed = fields.alg.as_deref().and_then(Algorithm::from_name);
    if claimed != Some(verifier.algorithm()) {
        return Err(Error::SignatureVerificationFailed);
    }

    // Step 2: key id
    if let (Some(expected), Some(actual)) = (config.key_id.as_deref(), fields.key_id.as_deref()) {
        if expected != actual {
            return Err(Error::SignatureVerificationFailed);
        }
    }

    // Step 3: signature
    verifier.check(&signed.signed_message, &signed.signature)?;

    // Step 4-6: timestamps
    if fields.issued_at > fields.expires_at {
        return Err(Error::InvalidTimestamp(format!(
            "issued_at {} is after expires_at {}",
            fields.issued_at, fields.expires_at
        )));
    }
    if fields.issued_at > now.saturating_add(config.skew_seconds()) {
        return Err(Error::InvalidTimestamp(format!(
            "issued_at {} is in the future (now {})",
            fields.issued_at, now
        )));
    }
    if fields.expires_at <= now {
        return Err(Error::TokenExpired);
    }

    // Step 7: content
    if fields.pins.is_empty() {
        return Err(Error::DecodingFailed("statement carries no pins".to_string()));
    }
    if fields.ttl_seconds < 0 {
        return Err(Error::DecodingFailed(format!(
            "negative ttl_seconds {}",
            fields.ttl_seconds
        )));
    }

    Ok(PinStatement::verified(signed.fields, signed.signature))
}

/// Fail unless `statement` covers `hostname`.
pub fn check_domain(statement: &PinStatement, hostname: &str) -> Result<(), Error> {
    if domain::matches(hostname, statement.domain()) {
        Ok(())
    } else {
        Err(Error::DomainMismatch {
            expected: hostname.to_string(),
            actual: statement.domain().to_string(),
        })
    }
}

/// When a cached copy of `statement` stops being usable: the TTL from `now`,
/// capped at the statement's own expiry.
pub fn cache_expiry(statement: &PinStatement, now: i64) -> i64 {
    now.saturating_add(statement.ttl_seconds())
        .min(statement.expires_at())
}
