//! Verify-only signature checks (ECDSA P-256 / SHA-256 and Ed25519) and SPKI
//! pin hashing.
//!
//! Nothing in this module ever touches private keys: the client only has to
//! authenticate statements signed elsewhere.

use std::fmt;

use p256::ecdsa::signature::Verifier;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::der;
use crate::error::Error;

/// Length of a raw Ed25519 public key.
const ED25519_KEY_LEN: usize = 32;
/// Length of an Ed25519 SPKI: 12-byte fixed prefix followed by the raw key.
const ED25519_SPKI_LEN: usize = 44;
/// Length of a fixed-width ECDSA P-256 signature (`r || s`).
const P256_FIXED_SIG_LEN: usize = 64;

/// Signature algorithm a deployment signs pin statements with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "ES256")]
    EcdsaP256Sha256,
    #[serde(rename = "Ed25519")]
    Ed25519,
}

impl Algorithm {
    /// Parse an algorithm name as carried in a statement or token header.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ES256" => Some(Algorithm::EcdsaP256Sha256),
            "Ed25519" | "EdDSA" => Some(Algorithm::Ed25519),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::EcdsaP256Sha256 => "ES256",
            Algorithm::Ed25519 => "Ed25519",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Public key of the pin-statement signer, in whatever form the deployment
/// ships it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicKeyMaterial {
    /// PEM-encoded SubjectPublicKeyInfo.
    Pem(String),
    /// DER-encoded SubjectPublicKeyInfo.
    SpkiDer(#[serde(with = "hex_bytes")] Vec<u8>),
    /// Raw key: 32 bytes for Ed25519, a SEC1 point (`0x04 || X || Y`) for P-256.
    Raw(#[serde(with = "hex_bytes")] Vec<u8>),
}

impl fmt::Debug for PublicKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublicKeyMaterial::Pem(_) => f.write_str("PublicKeyMaterial::Pem(..)"),
            PublicKeyMaterial::SpkiDer(b) => write!(f, "PublicKeyMaterial::SpkiDer({} bytes)", b.len()),
            PublicKeyMaterial::Raw(b) => write!(f, "PublicKeyMaterial::Raw({} bytes)", b.len()),
        }
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

/// A parsed verification key.
#[derive(Clone)]
enum VerifierKey {
    Ecdsa(p256::ecdsa::VerifyingKey),
    Ed25519(ed25519_dalek::VerifyingKey),
}

/// Verifies detached signatures for one algorithm and one signer key.
#[derive(Clone)]
pub struct SignatureVerifier {
    algorithm: Algorithm,
    key: VerifierKey,
}

impl fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl SignatureVerifier {
    /// Parse `key` for `algorithm`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPublicKey`] if the material is not a valid key
    /// of the requested type.
    pub fn new(algorithm: Algorithm, key: &PublicKeyMaterial) -> Result<Self, Error> {
        let key = match algorithm {
            Algorithm::EcdsaP256Sha256 => VerifierKey::Ecdsa(parse_p256_key(key)?),
            Algorithm::Ed25519 => VerifierKey::Ed25519(parse_ed25519_key(key)?),
        };
        Ok(Self { algorithm, key })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Check `signature` over exactly `message`.
    ///
    /// For ECDSA the signature may be fixed-width `r || s` (64 bytes) or ASN.1
    /// DER; both encode the same `(r, s)` pair.
    pub fn check(&self, message: &[u8], signature: &[u8]) -> Result<(), Error> {
        let valid = match &self.key {
            VerifierKey::Ecdsa(vk) => {
                let fixed = if signature.len() == P256_FIXED_SIG_LEN {
                    p256::ecdsa::Signature::from_slice(signature).ok()
                } else {
                    None
                };
                let der = p256::ecdsa::Signature::from_der(signature).ok();
                [fixed, der]
                    .iter()
                    .flatten()
                    .any(|sig| vk.verify(message, sig).is_ok())
            }
            VerifierKey::Ed25519(vk) => match ed25519_dalek::Signature::from_slice(signature) {
                Ok(sig) => vk.verify_strict(message, &sig).is_ok(),
                Err(_) => false,
            },
        };

        if valid {
            Ok(())
        } else {
            Err(Error::SignatureVerificationFailed)
        }
    }

    /// Boolean form of [`check`](Self::check).
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        self.check(message, signature).is_ok()
    }
}

/// Verify a detached signature. Malformed keys and signatures yield `false`.
pub fn verify(
    message: &[u8],
    signature: &[u8],
    public_key: &PublicKeyMaterial,
    algorithm: Algorithm,
) -> bool {
    SignatureVerifier::new(algorithm, public_key)
        .map(|v| v.verify(message, signature))
        .unwrap_or(false)
}

fn parse_p256_key(key: &PublicKeyMaterial) -> Result<p256::ecdsa::VerifyingKey, Error> {
    use p256::pkcs8::DecodePublicKey;

    let invalid = |e: &dyn fmt::Display| Error::InvalidPublicKey(format!("P-256: {}", e));
    match key {
        PublicKeyMaterial::Pem(pem) => p256::PublicKey::from_public_key_pem(pem)
            .map(p256::ecdsa::VerifyingKey::from)
            .map_err(|e| invalid(&e)),
        PublicKeyMaterial::SpkiDer(der) => p256::PublicKey::from_public_key_der(der)
            .map(p256::ecdsa::VerifyingKey::from)
            .map_err(|e| invalid(&e)),
        PublicKeyMaterial::Raw(point) => {
            p256::ecdsa::VerifyingKey::from_sec1_bytes(point).map_err(|e| invalid(&e))
        }
    }
}

/// Ed25519 keys wrapped in an SPKI are unwrapped by taking the last 32 bytes
/// of the 44-byte structure. This holds only because the Ed25519 SPKI prefix
/// has a fixed length; it is not a general SPKI decoder.
fn parse_ed25519_key(key: &PublicKeyMaterial) -> Result<ed25519_dalek::VerifyingKey, Error> {
    let invalid = |msg: String| Error::InvalidPublicKey(format!("Ed25519: {}", msg));

    let raw: [u8; ED25519_KEY_LEN] = match key {
        PublicKeyMaterial::Pem(pem) => {
            return <ed25519_dalek::VerifyingKey as ed25519_dalek::pkcs8::DecodePublicKey>::from_public_key_pem(pem)
                .map_err(|e| invalid(e.to_string()));
        }
        PublicKeyMaterial::SpkiDer(spki) => {
            let spki = der::parse_spki(spki).map_err(|e| invalid(e.to_string()))?;
            if spki.len() != ED25519_SPKI_LEN {
                return Err(invalid(format!("SPKI is {} bytes, expected {}", spki.len(), ED25519_SPKI_LEN)));
            }
            spki[ED25519_SPKI_LEN - ED25519_KEY_LEN..]
                .try_into()
                .map_err(|_| invalid("bad key length".to_string()))?
        }
        PublicKeyMaterial::Raw(raw) => raw
            .as_slice()
            .try_into()
            .map_err(|_| invalid(format!("raw key is {} bytes, expected {}", raw.len(), ED25519_KEY_LEN)))?,
    };

    ed25519_dalek::VerifyingKey::from_bytes(&raw).map_err(|e| invalid(e.to_string()))
}

/// SHA-256 over exactly `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(Sha256::digest(data).as_slice());
    out
}

/// Pin of an SPKI: lower-case hex SHA-256 of its full TLV.
pub fn spki_pin(spki: &[u8]) -> String {
    hex::encode(sha256(spki))
}

/// Leading characters of a pin, for log lines.
pub(crate) fn pin_prefix(pin: &str) -> &str {
    pin.get(..8).unwrap_or(pin)
}

/// Extract the SPKI of a DER certificate and return its pin.
pub fn certificate_pin(cert_der: &[u8]) -> Result<String, Error> {
    Ok(spki_pin(der::spki_span(cert_der)?))
}

/// Compare `digest` against every pin, case-insensitively and in constant
/// time per pin. Pins that are not 64 hex characters never match.
pub fn matches_any_pin(digest: &[u8; 32], pins: &[String]) -> bool {
    let mut matched = subtle::Choice::from(0u8);
    for pin in pins {
        let mut expected = [0u8; 32];
        if hex::decode_to_slice(pin, &mut expected).is_err() {
            continue;
        }
        matched |= expected[..].ct_eq(&digest[..]);
    }
    matched.into()
}
