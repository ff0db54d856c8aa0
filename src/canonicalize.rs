//! Canonical payload serialization and wire decoding for pin statements.
//!
//! Signature checks are byte-exact, so the canonical writer reproduces the
//! signer's output exactly: fixed key order, no whitespace, decimal integers,
//! and only `\\`, `"`, `\n`, `\r` and `\t` escaped.

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::statement::{
    FlatPayload, FlatRecordWire, SignedStatement, StatementFields, TokenHeader, TokenPayload,
};

/// Which response shape and canonical layout a deployment uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireProfile {
    /// `{domain, pins, created, expires, ttl_seconds, keyId, alg, signature}`
    /// signed over the canonical payload without `signature`.
    #[default]
    FlatRecord,
    /// `header.payload.signature` with payload
    /// `{domain, pins, iat, exp, ttl_seconds}`, signed over `header.payload`.
    Token,
}

/// The exact bytes of the canonical payload for `fields` under `profile`.
///
/// # Errors
///
/// The flat-record layout signs `keyId` and `alg`; if either is missing this
/// returns [`Error::DecodingFailed`] rather than inventing a value.
pub fn canonical_bytes(fields: &StatementFields, profile: WireProfile) -> Result<Vec<u8>, Error> {
    let mut out = String::with_capacity(128 + fields.pins.len() * 68);
    out.push_str("{\"domain\":");
    write_string(&mut out, &fields.domain);
    out.push_str(",\"pins\":[");
    for (i, pin) in fields.pins.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_string(&mut out, pin);
    }
    out.push(']');

    match profile {
        WireProfile::FlatRecord => {
            let key_id = fields
                .key_id
                .as_deref()
                .ok_or_else(|| Error::DecodingFailed("keyId is required".to_string()))?;
            let alg = fields
                .alg
                .as_deref()
                .ok_or_else(|| Error::DecodingFailed("alg is required".to_string()))?;

            write_int(&mut out, "created", fields.issued_at);
            write_int(&mut out, "expires", fields.expires_at);
            write_int(&mut out, "ttl_seconds", fields.ttl_seconds);
            out.push_str(",\"keyId\":");
            write_string(&mut out, key_id);
            out.push_str(",\"alg\":");
            write_string(&mut out, alg);
        }
        WireProfile::Token => {
            write_int(&mut out, "iat", fields.issued_at);
            write_int(&mut out, "exp", fields.expires_at);
            write_int(&mut out, "ttl_seconds", fields.ttl_seconds);
        }
    }

    out.push('}');
    Ok(out.into_bytes())
}

fn write_int(out: &mut String, key: &str, value: i64) {
    out.push_str(",\"");
    out.push_str(key);
    out.push_str("\":");
    out.push_str(&value.to_string());
}

fn write_string(out: &mut String, value: &str) {
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Parse a canonical payload (no signature) back into fields.
pub fn parse_canonical(bytes: &[u8], profile: WireProfile) -> Result<StatementFields, Error> {
    match profile {
        WireProfile::FlatRecord => Ok(serde_json::from_slice::<FlatPayload>(bytes)?.into()),
        WireProfile::Token => {
            let payload: TokenPayload = serde_json::from_slice(bytes)?;
            Ok(StatementFields {
                domain: payload.domain,
                pins: payload.pins,
                issued_at: payload.iat,
                expires_at: payload.exp,
                ttl_seconds: payload.ttl_seconds,
                key_id: None,
                alg: None,
            })
        }
    }
}

/// Decode a response body into fields, signed bytes and signature.
///
/// Token bodies may be the bare compact string, a JSON string, or a JSON
/// object with a `token` member.
pub fn decode(wire: &[u8], profile: WireProfile) -> Result<SignedStatement, Error> {
    match profile {
        WireProfile::FlatRecord => decode_flat_record(wire),
        WireProfile::Token => decode_token(&extract_token(wire)?),
    }
}

fn decode_flat_record(wire: &[u8]) -> Result<SignedStatement, Error> {
    let record: FlatRecordWire = serde_json::from_slice(wire)?;
    let signature = general_purpose::STANDARD.decode(record.signature.as_bytes())?;
    let fields: StatementFields = record.payload.into();
    let signed_message = canonical_bytes(&fields, WireProfile::FlatRecord)?;

    Ok(SignedStatement {
        fields,
        signed_message,
        signature,
    })
}

#[derive(Deserialize)]
struct TokenEnvelope {
    token: String,
}

fn extract_token(wire: &[u8]) -> Result<String, Error> {
    let text = std::str::from_utf8(wire)
        .map_err(|_| Error::DecodingFailed("token body is not UTF-8".to_string()))?
        .trim();

    match text.as_bytes().first() {
        Some(b'"') => Ok(serde_json::from_str::<String>(text)?),
        Some(b'{') => Ok(serde_json::from_str::<TokenEnvelope>(text)?.token),
        Some(_) => Ok(text.to_string()),
        None => Err(Error::DecodingFailed("empty response body".to_string())),
    }
}

fn decode_token(token: &str) -> Result<SignedStatement, Error> {
    let mut parts = token.split('.');
    let (header_b64, payload_b64, signature_b64) =
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(p), Some(s), None) if !h.is_empty() && !p.is_empty() && !s.is_empty() => {
                (h, p, s)
            }
            _ => {
                return Err(Error::DecodingFailed(
                    "token must have exactly three non-empty segments".to_string(),
                ))
            }
        };

    let header: TokenHeader =
        serde_json::from_slice(&general_purpose::URL_SAFE_NO_PAD.decode(header_b64)?)?;
    let payload: TokenPayload =
        serde_json::from_slice(&general_purpose::URL_SAFE_NO_PAD.decode(payload_b64)?)?;
    let signature = general_purpose::URL_SAFE_NO_PAD.decode(signature_b64)?;

    let signed_message = format!("{}.{}", header_b64, payload_b64).into_bytes();
    Ok(SignedStatement {
        fields: payload.into_fields(&header),
        signed_message,
        signature,
    })
}

/// The `header.payload` signing input of a token carrying `fields`.
pub fn token_signing_input(header: &TokenHeader, fields: &StatementFields) -> Result<String, Error> {
    let header_json = serde_json::to_vec(header)?;
    let payload = canonical_bytes(fields, WireProfile::Token)?;
    Ok(format!(
        "{}.{}",
        general_purpose::URL_SAFE_NO_PAD.encode(header_json),
        general_purpose::URL_SAFE_NO_PAD.encode(payload)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_fields() -> StatementFields {
        StatementFields {
            domain: "example.com".to_string(),
            pins: vec!["aa".to_string(), "bb".to_string()],
            issued_at: 1_700_000_000,
            expires_at: 1_700_003_600,
            ttl_seconds: 3600,
            key_id: Some("key-1".to_string()),
            alg: Some("ES256".to_string()),
        }
    }

    #[test]
    fn test_flat_record_golden_bytes() {
        let bytes = canonical_bytes(&sample_fields(), WireProfile::FlatRecord).unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            r#"{"domain":"example.com","pins":["aa","bb"],"created":1700000000,"expires":1700003600,"ttl_seconds":3600,"keyId":"key-1","alg":"ES256"}"#
        );
    }

    #[test]
    fn test_flat_record_ed25519_vector() {
        let mut fields = sample_fields();
        fields.alg = Some("Ed25519".to_string());
        let bytes = canonical_bytes(&fields, WireProfile::FlatRecord).unwrap();

        let signer = crate::test_support::Ed25519Signer::from_seed([7u8; 32]);
        let signature = general_purpose::STANDARD.encode(signer.sign(&bytes));
        assert_eq!(
            signature,
            "kqFIGQN+PcgyIn+T22lZSjaf2wVZhTPa2kXKgpFM0MfvPeK1om55IGLkPDfsCZlJQ93mAqkblCI9lr1/iDxIDw=="
        );

        let key = crate::crypto::PublicKeyMaterial::Raw(
            hex::decode("ea4a6c63e29c520abef5507b132ec5f9954776aebebe7b92421eea691446d22c").unwrap(),
        );
        let verifier = crate::crypto::SignatureVerifier::new(crate::crypto::Algorithm::Ed25519, &key).unwrap();

        let mut record: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        record["signature"] = signature.into();
        let signed = decode(&serde_json::to_vec(&record).unwrap(), WireProfile::FlatRecord).unwrap();
        assert_eq!(signed.signed_message, bytes);
        assert!(verifier.check(&signed.signed_message, &signed.signature).is_ok());
    }

    #[test]
    fn test_token_golden_bytes() {
        let bytes = canonical_bytes(&sample_fields(), WireProfile::Token).unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            r#"{"domain":"example.com","pins":["aa","bb"],"iat":1700000000,"exp":1700003600,"ttl_seconds":3600}"#
        );
    }

    #[test]
    fn test_escaping_golden_bytes() {
        let mut fields = sample_fields();
        fields.domain = "a\\b\"c\nd\re\tf/g\u{1}h\u{e9}".to_string();
        fields.pins = vec![];
        fields.issued_at = -5;
        let bytes = canonical_bytes(&fields, WireProfile::Token).unwrap();
        let expected = "{\"domain\":\"a\\\\b\\\"c\\nd\\re\\tf/g\u{1}h\u{e9}\",\"pins\":[],\"iat\":-5,\"exp\":1700003600,\"ttl_seconds\":3600}";
        assert_eq!(bytes, expected.as_bytes());
    }

    #[test]
    fn test_flat_record_needs_key_id_and_alg() {
        let mut fields = sample_fields();
        fields.key_id = None;
        assert!(matches!(
            canonical_bytes(&fields, WireProfile::FlatRecord),
            Err(Error::DecodingFailed(_))
        ));
        // The token layout does not sign them.
        assert!(canonical_bytes(&fields, WireProfile::Token).is_ok());
    }

    #[test]
    fn test_decode_flat_record() {
        let body = r#"{"domain":"example.com","pins":["aa","bb"],"created":1700000000,"expires":1700003600,"ttl_seconds":3600,"keyId":"key-1","alg":"ES256","signature":"AQID"}"#;
        let signed = decode(body.as_bytes(), WireProfile::FlatRecord).unwrap();
        assert_eq!(signed.fields, sample_fields());
        assert_eq!(signed.signature, vec![1, 2, 3]);
        assert_eq!(
            signed.signed_message,
            canonical_bytes(&sample_fields(), WireProfile::FlatRecord).unwrap()
        );
    }

    #[test]
    fn test_decode_flat_record_reorders_to_canonical() {
        // Servers may emit keys in any order; the signed bytes do not change.
        let body = r#"{ "signature":"AQID", "alg":"ES256", "keyId":"key-1", "ttl_seconds":3600,
            "expires":1700003600, "created":1700000000, "pins":["aa","bb"], "domain":"example.com" }"#;
        let signed = decode(body.as_bytes(), WireProfile::FlatRecord).unwrap();
        assert_eq!(
            signed.signed_message,
            canonical_bytes(&sample_fields(), WireProfile::FlatRecord).unwrap()
        );
    }

    #[test]
    fn test_decode_rejects_structural_errors() {
        let cases: [&[u8]; 5] = [
            b"",
            b"not json",
            br#"{"domain":"example.com"}"#,
            br#"{"domain":"example.com","pins":"aa","created":1,"expires":2,"ttl_seconds":1,"keyId":"k","alg":"ES256","signature":"AA=="}"#,
            br#"{"domain":"example.com","pins":["aa"],"created":1,"expires":2,"ttl_seconds":1,"keyId":"k","alg":"ES256","signature":"***"}"#,
        ];
        for body in cases {
            assert!(
                matches!(decode(body, WireProfile::FlatRecord), Err(Error::DecodingFailed(_))),
                "accepted {:?}",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[test]
    fn test_decode_token_forms() {
        let header = TokenHeader {
            alg: "ES256".to_string(),
            kid: Some("key-9".to_string()),
            typ: Some("JWT".to_string()),
        };
        let input = token_signing_input(&header, &sample_fields()).unwrap();
        let token = format!("{}.{}", input, general_purpose::URL_SAFE_NO_PAD.encode([9u8, 8, 7]));

        let bodies = [
            token.clone(),
            format!("  {}\n", token),
            serde_json::to_string(&token).unwrap(),
            format!(r#"{{"token":"{}"}}"#, token),
        ];
        for body in bodies {
            let signed = decode(body.as_bytes(), WireProfile::Token).unwrap();
            assert_eq!(signed.signed_message, input.as_bytes());
            assert_eq!(signed.signature, vec![9, 8, 7]);
            assert_eq!(signed.fields.domain, "example.com");
            assert_eq!(signed.fields.key_id.as_deref(), Some("key-9"));
            assert_eq!(signed.fields.alg.as_deref(), Some("ES256"));
        }
    }

    #[test]
    fn test_decode_token_rejects_bad_segments() {
        for body in ["a.b", "a.b.c.d", "..", "a..c", "!!.b.c"] {
            assert!(
                matches!(decode(body.as_bytes(), WireProfile::Token), Err(Error::DecodingFailed(_))),
                "accepted {}",
                body
            );
        }
    }

    #[test]
    fn test_token_payload_signature_covers_received_segments() {
        // Re-encoding the payload differently must change the signed bytes.
        let header = TokenHeader {
            alg: "ES256".to_string(),
            kid: None,
            typ: None,
        };
        let header_b64 = general_purpose::URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap());
        let spaced = br#"{ "domain":"example.com","pins":["aa"],"iat":1,"exp":2,"ttl_seconds":1}"#;
        let payload_b64 = general_purpose::URL_SAFE_NO_PAD.encode(spaced);
        let token = format!("{}.{}.AQ", header_b64, payload_b64);

        let signed = decode(token.as_bytes(), WireProfile::Token).unwrap();
        assert_eq!(signed.signed_message, format!("{}.{}", header_b64, payload_b64).into_bytes());
    }

    fn field_string() -> impl Strategy<Value = String> {
        proptest::string::string_regex("[a-zA-Z0-9.*\\\\\"\n\r\t /é-]{0,24}").unwrap()
    }

    proptest! {
        #[test]
        fn prop_canonical_roundtrip(
            domain in field_string(),
            pins in proptest::collection::vec("[0-9a-f]{64}", 0..4),
            issued_at in any::<i64>(),
            expires_at in any::<i64>(),
            ttl_seconds in any::<i64>(),
            key_id in field_string(),
            alg in field_string(),
        ) {
            let fields = StatementFields {
                domain,
                pins,
                issued_at,
                expires_at,
                ttl_seconds,
                key_id: Some(key_id),
                alg: Some(alg),
            };

            let flat = canonical_bytes(&fields, WireProfile::FlatRecord).unwrap();
            let parsed = parse_canonical(&flat, WireProfile::FlatRecord).unwrap();
            prop_assert_eq!(&parsed, &fields);
            prop_assert_eq!(canonical_bytes(&parsed, WireProfile::FlatRecord).unwrap(), flat);

            let token = canonical_bytes(&fields, WireProfile::Token).unwrap();
            let parsed = parse_canonical(&token, WireProfile::Token).unwrap();
            prop_assert_eq!(&parsed.domain, &fields.domain);
            prop_assert_eq!(&parsed.pins, &fields.pins);
            prop_assert_eq!(canonical_bytes(&parsed, WireProfile::Token).unwrap(), token);
        }
    }
}
