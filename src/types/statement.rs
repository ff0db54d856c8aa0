use serde::{Deserialize, Serialize};

/// The signed fields of a pin statement, before authentication.
///
/// Timestamps are Unix seconds. `key_id` and `alg` are part of the signed
/// payload in the flat-record layout and come from the token header in the
/// token layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementFields {
    pub domain: String,
    pub pins: Vec<String>,
    pub issued_at: i64,
    pub expires_at: i64,
    pub ttl_seconds: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
}

/// A decoded but not yet verified response: the fields, the exact bytes the
/// signature covers, and the detached signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedStatement {
    pub fields: StatementFields,
    pub signed_message: Vec<u8>,
    pub signature: Vec<u8>,
}

/// A pin statement whose signature, timestamps and domain have been checked.
///
/// Only [`verification::verify_statement`](crate::verification::verify_statement)
/// builds these, and they are never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinStatement {
    fields: StatementFields,
    signature: Vec<u8>,
}

impl PinStatement {
    pub(crate) fn verified(fields: StatementFields, signature: Vec<u8>) -> Self {
        Self { fields, signature }
    }

    /// Host or `*.suffix` pattern asserted by the signer.
    pub fn domain(&self) -> &str {
        &self.fields.domain
    }

    /// Pins in signer order; the first is the primary pin.
    pub fn pins(&self) -> &[String] {
        &self.fields.pins
    }

    pub fn issued_at(&self) -> i64 {
        self.fields.issued_at
    }

    pub fn expires_at(&self) -> i64 {
        self.fields.expires_at
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.fields.ttl_seconds
    }

    pub fn key_id(&self) -> Option<&str> {
        self.fields.key_id.as_deref()
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn fields(&self) -> &StatementFields {
        &self.fields
    }
}

/// Flat-record payload, in signing order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct FlatPayload {
    pub domain: String,
    pub pins: Vec<String>,
    pub created: i64,
    pub expires: i64,
    pub ttl_seconds: i64,
    #[serde(rename = "keyId")]
    pub key_id: String,
    pub alg: String,
}

/// Flat record as served: payload plus base64 signature.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FlatRecordWire {
    #[serde(flatten)]
    pub payload: FlatPayload,
    pub signature: String,
}

/// Token payload, in signing order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TokenPayload {
    pub domain: String,
    pub pins: Vec<String>,
    pub iat: i64,
    pub exp: i64,
    pub ttl_seconds: i64,
}

/// Protected header of a compact token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHeader {
    pub alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
}

impl From<FlatPayload> for StatementFields {
    fn from(p: FlatPayload) -> Self {
        Self {
            domain: p.domain,
            pins: p.pins,
            issued_at: p.created,
            expires_at: p.expires,
            ttl_seconds: p.ttl_seconds,
            key_id: Some(p.key_id),
            alg: Some(p.alg),
        }
    }
}

impl TokenPayload {
    pub(crate) fn into_fields(self, header: &TokenHeader) -> StatementFields {
        StatementFields {
            domain: self.domain,
            pins: self.pins,
            issued_at: self.iat,
            expires_at: self.exp,
            ttl_seconds: self.ttl_seconds,
            key_id: header.kid.clone(),
            alg: Some(header.alg.clone()),
        }
    }
}
