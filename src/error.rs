use thiserror::Error;

use crate::der::DerError;

/// Every way a pin validation can fail.
///
/// Any of these reaching the [`ValidationEngine`](crate::engine::ValidationEngine)
/// boundary becomes a `Reject`. The type is `Clone` so the same value can be
/// handed to the caller and to the observability sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Malformed certificate: {0}")]
    MalformedCertificate(#[from] DerError),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Signature verification failed")]
    SignatureVerificationFailed,

    #[error("Domain mismatch: expected '{expected}', statement covers '{actual}'")]
    DomainMismatch { expected: String, actual: String },

    #[error("Pin statement expired")]
    TokenExpired,

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Unexpected HTTP status {0}")]
    InvalidStatusCode(u16),

    #[error("Decoding failed: {0}")]
    DecodingFailed(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("No pin matched the presented certificate")]
    HashMismatch,
}

impl Error {
    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::MalformedCertificate(_) => ErrorCode::MalformedCertificate,
            Error::InvalidPublicKey(_) => ErrorCode::InvalidPublicKey,
            Error::SignatureVerificationFailed => ErrorCode::SignatureVerificationFailed,
            Error::DomainMismatch { .. } => ErrorCode::DomainMismatch,
            Error::TokenExpired => ErrorCode::TokenExpired,
            Error::InvalidTimestamp(_) => ErrorCode::InvalidTimestamp,
            Error::NetworkFailure(_) => ErrorCode::NetworkFailure,
            Error::InvalidStatusCode(_) => ErrorCode::InvalidStatusCode,
            Error::DecodingFailed(_) => ErrorCode::DecodingFailed,
            Error::StorageUnavailable(_) => ErrorCode::StorageUnavailable,
            Error::HashMismatch => ErrorCode::HashMismatch,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::DecodingFailed(err.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::DecodingFailed(format!("base64: {}", err))
    }
}

impl From<hex::FromHexError> for Error {
    fn from(err: hex::FromHexError) -> Self {
        Error::DecodingFailed(format!("hex: {}", err))
    }
}

/// Error codes for structured events and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorCode {
    #[serde(rename = "MALFORMED_CERTIFICATE")]
    MalformedCertificate,
    #[serde(rename = "INVALID_PUBLIC_KEY")]
    InvalidPublicKey,
    #[serde(rename = "SIGNATURE_VERIFICATION_FAILED")]
    SignatureVerificationFailed,
    #[serde(rename = "DOMAIN_MISMATCH")]
    DomainMismatch,
    #[serde(rename = "TOKEN_EXPIRED")]
    TokenExpired,
    #[serde(rename = "INVALID_TIMESTAMP")]
    InvalidTimestamp,
    #[serde(rename = "NETWORK_FAILURE")]
    NetworkFailure,
    #[serde(rename = "INVALID_STATUS_CODE")]
    InvalidStatusCode,
    #[serde(rename = "DECODING_FAILED")]
    DecodingFailed,
    #[serde(rename = "STORAGE_UNAVAILABLE")]
    StorageUnavailable,
    #[serde(rename = "HASH_MISMATCH")]
    HashMismatch,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::MalformedCertificate => "MALFORMED_CERTIFICATE",
            ErrorCode::InvalidPublicKey => "INVALID_PUBLIC_KEY",
            ErrorCode::SignatureVerificationFailed => "SIGNATURE_VERIFICATION_FAILED",
            ErrorCode::DomainMismatch => "DOMAIN_MISMATCH",
            ErrorCode::TokenExpired => "TOKEN_EXPIRED",
            ErrorCode::InvalidTimestamp => "INVALID_TIMESTAMP",
            ErrorCode::NetworkFailure => "NETWORK_FAILURE",
            ErrorCode::InvalidStatusCode => "INVALID_STATUS_CODE",
            ErrorCode::DecodingFailed => "DECODING_FAILED",
            ErrorCode::StorageUnavailable => "STORAGE_UNAVAILABLE",
            ErrorCode::HashMismatch => "HASH_MISMATCH",
        };
        write!(f, "{}", s)
    }
}
