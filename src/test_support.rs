//! Fixtures shared by the unit tests: DER builders, throwaway signing keys
//! and wire-format builders for signed statements.

use std::sync::atomic::{AtomicUsize, Ordering};

use base64::{engine::general_purpose, Engine as _};
use ed25519_dalek::Signer as _;
use p256::ecdsa::signature::Signer as _;
use p256::pkcs8::{EncodePublicKey, LineEnding};
use parking_lot::Mutex;
use rand::rngs::OsRng;

use crate::canonicalize::{canonical_bytes, token_signing_input, WireProfile};
use crate::crypto::{spki_pin, Algorithm, PublicKeyMaterial};
use crate::error::Error;
use crate::fetcher::{FetchRequest, HttpResponse, HttpTransport, PinSource};
use crate::storage::SecureStorage;
use crate::types::statement::{PinStatement, StatementFields, TokenHeader};

/// AlgorithmIdentifier contents for id-ecPublicKey / prime256v1.
pub const EC_SPKI_ALG: &[u8] = &[
    0x06, 0x07, 0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x02, 0x01, 0x06, 0x08, 0x2A, 0x86, 0x48, 0xCE,
    0x3D, 0x03, 0x01, 0x07,
];

/// Fixed 12-byte prefix of every Ed25519 SPKI.
const ED25519_SPKI_PREFIX: [u8; 12] = [
    0x30, 0x2A, 0x30, 0x05, 0x06, 0x03, 0x2B, 0x65, 0x70, 0x03, 0x21, 0x00,
];

fn encode_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
    } else if len < 0x100 {
        out.push(0x81);
        out.push(len as u8);
    } else {
        out.push(0x82);
        out.push((len >> 8) as u8);
        out.push(len as u8);
    }
}

pub fn tagged(tag: u8, contents: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    encode_length(&mut out, contents.len());
    out.extend_from_slice(contents);
    out
}

pub fn seq(contents: &[u8]) -> Vec<u8> {
    tagged(0x30, contents)
}

/// A structurally valid X.509 certificate around `spki`. The signature is
/// junk; only the layout matters to the extractor.
pub fn build_certificate(spki: &[u8], with_version: bool) -> Vec<u8> {
    let sig_alg = seq(&tagged(0x06, &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x04, 0x03, 0x02]));
    let name = seq(&tagged(
        0x31,
        &seq(&[tagged(0x06, &[0x55, 0x04, 0x03]), tagged(0x0C, b"test")].concat()),
    ));
    let validity = seq(&[tagged(0x17, b"250101000000Z"), tagged(0x17, b"350101000000Z")].concat());

    let mut tbs = Vec::new();
    if with_version {
        tbs.extend(tagged(0xA0, &tagged(0x02, &[0x02])));
    }
    tbs.extend(tagged(0x02, &[0x01]));
    tbs.extend(&sig_alg);
    tbs.extend(&name);
    tbs.extend(&validity);
    tbs.extend(&name);
    tbs.extend_from_slice(spki);

    seq(&[seq(&tbs), sig_alg, tagged(0x03, &[0x00, 0xDE, 0xAD])].concat())
}

/// A leaf certificate and the pin of its SPKI.
pub fn leaf_certificate(seed: u8) -> (Vec<u8>, String) {
    let mut bits = vec![0x00, 0x04];
    bits.extend(std::iter::repeat(seed).take(64));
    let spki = seq(&[seq(EC_SPKI_ALG), tagged(0x03, &bits)].concat());
    (build_certificate(&spki, true), spki_pin(&spki))
}

pub struct EcdsaSigner {
    key: p256::ecdsa::SigningKey,
}

impl EcdsaSigner {
    pub fn generate() -> Self {
        Self {
            key: p256::ecdsa::SigningKey::random(&mut OsRng),
        }
    }

    pub fn sign_der(&self, msg: &[u8]) -> Vec<u8> {
        let sig: p256::ecdsa::Signature = self.key.sign(msg);
        sig.to_der().as_bytes().to_vec()
    }

    pub fn sign_fixed(&self, msg: &[u8]) -> Vec<u8> {
        let sig: p256::ecdsa::Signature = self.key.sign(msg);
        sig.to_bytes().to_vec()
    }

    pub fn raw_material(&self) -> PublicKeyMaterial {
        let point = self.key.verifying_key().to_encoded_point(false);
        PublicKeyMaterial::Raw(point.as_bytes().to_vec())
    }

    pub fn spki_material(&self) -> PublicKeyMaterial {
        let der = self.key.verifying_key().to_public_key_der().unwrap();
        PublicKeyMaterial::SpkiDer(der.as_bytes().to_vec())
    }

    pub fn pem_material(&self) -> PublicKeyMaterial {
        PublicKeyMaterial::Pem(
            self.key
                .verifying_key()
                .to_public_key_pem(LineEnding::LF)
                .unwrap(),
        )
    }
}

pub struct Ed25519Signer {
    key: ed25519_dalek::SigningKey,
}

impl Ed25519Signer {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            key: ed25519_dalek::SigningKey::from_bytes(&seed),
        }
    }

    pub fn sign(&self, msg: &[u8]) -> Vec<u8> {
        self.key.sign(msg).to_bytes().to_vec()
    }

    pub fn raw_material(&self) -> PublicKeyMaterial {
        PublicKeyMaterial::Raw(self.key.verifying_key().to_bytes().to_vec())
    }

    pub fn spki_material(&self) -> PublicKeyMaterial {
        let mut spki = ED25519_SPKI_PREFIX.to_vec();
        spki.extend_from_slice(&self.key.verifying_key().to_bytes());
        PublicKeyMaterial::SpkiDer(spki)
    }
}

/// Either kind of signer, signing the way each wire profile expects.
pub enum TestSigner {
    Ecdsa(EcdsaSigner),
    Ed25519(Ed25519Signer),
}

impl TestSigner {
    pub fn ecdsa() -> Self {
        TestSigner::Ecdsa(EcdsaSigner::generate())
    }

    pub fn ed25519() -> Self {
        TestSigner::Ed25519(Ed25519Signer::from_seed([42u8; 32]))
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            TestSigner::Ecdsa(_) => Algorithm::EcdsaP256Sha256,
            TestSigner::Ed25519(_) => Algorithm::Ed25519,
        }
    }

    pub fn material(&self) -> PublicKeyMaterial {
        match self {
            TestSigner::Ecdsa(s) => s.spki_material(),
            TestSigner::Ed25519(s) => s.raw_material(),
        }
    }

    /// Flat records carry DER ECDSA signatures; tokens carry fixed `r || s`.
    pub fn sign(&self, msg: &[u8], profile: WireProfile) -> Vec<u8> {
        match (self, profile) {
            (TestSigner::Ecdsa(s), WireProfile::FlatRecord) => s.sign_der(msg),
            (TestSigner::Ecdsa(s), WireProfile::Token) => s.sign_fixed(msg),
            (TestSigner::Ed25519(s), _) => s.sign(msg),
        }
    }
}

/// Statement fields for `domain` issued at `now`, valid for an hour.
pub fn statement_fields(domain: &str, pins: Vec<String>, now: i64, signer: &TestSigner) -> StatementFields {
    StatementFields {
        domain: domain.to_string(),
        pins,
        issued_at: now,
        expires_at: now + 3600,
        ttl_seconds: 3600,
        key_id: Some("test-key".to_string()),
        alg: Some(signer.algorithm().name().to_string()),
    }
}

/// Sign `fields` and render a response body in `profile`.
pub fn signed_body(fields: &StatementFields, signer: &TestSigner, profile: WireProfile) -> Vec<u8> {
    match profile {
        WireProfile::FlatRecord => {
            let payload = canonical_bytes(fields, profile).unwrap();
            let signature = signer.sign(&payload, profile);
            let mut record: serde_json::Value = serde_json::from_slice(&payload).unwrap();
            record["signature"] = general_purpose::STANDARD.encode(signature).into();
            serde_json::to_vec(&record).unwrap()
        }
        WireProfile::Token => {
            let header = TokenHeader {
                alg: fields.alg.clone().unwrap_or_else(|| signer.algorithm().name().to_string()),
                kid: fields.key_id.clone(),
                typ: Some("JWT".to_string()),
            };
            let input = token_signing_input(&header, fields).unwrap();
            let signature = signer.sign(input.as_bytes(), profile);
            format!("{}.{}", input, general_purpose::URL_SAFE_NO_PAD.encode(signature)).into_bytes()
        }
    }
}

/// Storage whose every operation fails.
pub struct FailingStorage;

impl SecureStorage for FailingStorage {
    fn put(&self, _key: &str, _value: &[u8]) -> Result<(), Error> {
        Err(Error::StorageUnavailable("put refused".to_string()))
    }

    fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, Error> {
        Err(Error::StorageUnavailable("get refused".to_string()))
    }

    fn delete(&self, _key: &str) -> Result<(), Error> {
        Err(Error::StorageUnavailable("delete refused".to_string()))
    }
}

/// Transport that answers every request with the same canned response and
/// records what it was asked for.
pub struct StaticTransport {
    response: Result<HttpResponse, Error>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl StaticTransport {
    pub fn ok(body: Vec<u8>) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: Vec<u8>) -> Self {
        Self {
            response: Ok(HttpResponse { status, body }),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            response: Err(Error::NetworkFailure("connection refused".to_string())),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().clone()
    }

    fn respond(&self, request: &FetchRequest) -> Result<HttpResponse, Error> {
        self.requests.lock().push(request.clone());
        self.response.clone()
    }
}

impl HttpTransport for StaticTransport {
    fn get(&self, request: &FetchRequest) -> Result<HttpResponse, Error> {
        self.respond(request)
    }
}

#[cfg(feature = "fetch")]
#[async_trait::async_trait]
impl crate::fetcher::AsyncHttpTransport for StaticTransport {
    async fn get(&self, request: &FetchRequest) -> Result<HttpResponse, Error> {
        self.respond(request)
    }
}

/// Pin source that returns a fixed result and counts calls.
pub struct ScriptedSource {
    result: Result<PinStatement, Error>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(result: Result<PinStatement, Error>) -> Self {
        Self {
            result,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PinSource for ScriptedSource {
    fn fetch(&self, _domain: &str, _include_backup_pins: bool) -> Result<PinStatement, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}
