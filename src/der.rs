//! Minimal DER reader that locates the SubjectPublicKeyInfo of an X.509
//! certificate.
//!
//! ```text
//! Certificate ::= SEQUENCE {
//!     tbsCertificate  SEQUENCE {
//!         version         [0] EXPLICIT INTEGER OPTIONAL,
//!         serialNumber    INTEGER,
//!         signature       AlgorithmIdentifier (SEQUENCE),
//!         issuer          Name (SEQUENCE),
//!         validity        SEQUENCE,
//!         subject         Name (SEQUENCE),
//!         subjectPublicKeyInfo  SEQUENCE   <- extracted verbatim
//!         ...
//!     },
//!     signatureAlgorithm  AlgorithmIdentifier,
//!     signatureValue      BIT STRING,
//! }
//! ```
//!
//! The SPKI is returned as its complete TLV (tag, length and content), which
//! is the byte range hashed for SPKI pinning (RFC 7469). Nothing inside the
//! SPKI is interpreted.

use thiserror::Error;

const TAG_SEQUENCE: u8 = 0x30;
const TAG_INTEGER: u8 = 0x02;
const TAG_BIT_STRING: u8 = 0x03;
const TAG_CONTEXT_0: u8 = 0xA0;

/// Length fields wider than this are rejected outright.
const MAX_LENGTH_OCTETS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DerError {
    #[error("unexpected end of input")]
    Truncated,
    #[error("expected tag 0x{expected:02x}, found 0x{found:02x}")]
    UnexpectedTag { expected: u8, found: u8 },
    #[error("malformed length encoding")]
    BadLength,
    #[error("trailing bytes after structure")]
    TrailingData,
}

/// A single TLV element borrowed from the input.
#[derive(Debug, Clone, Copy)]
struct Tlv<'a> {
    tag: u8,
    /// Content octets only.
    value: &'a [u8],
    /// Tag, length header and content.
    raw: &'a [u8],
}

/// Parse the TLV at the start of `data`.
fn parse_tlv(data: &[u8]) -> Result<Tlv<'_>, DerError> {
    let (&tag, rest) = data.split_first().ok_or(DerError::Truncated)?;
    let (len, header_len) = parse_length(rest)?;

    let start = 1 + header_len;
    let end = start.checked_add(len).ok_or(DerError::BadLength)?;
    if end > data.len() {
        return Err(DerError::Truncated);
    }

    Ok(Tlv {
        tag,
        value: &data[start..end],
        raw: &data[..end],
    })
}

/// Decode a length field. Returns `(content_length, length_octets_consumed)`.
fn parse_length(data: &[u8]) -> Result<(usize, usize), DerError> {
    let first = *data.first().ok_or(DerError::Truncated)?;

    if first < 0x80 {
        return Ok((first as usize, 1));
    }

    // 0x80 is the BER indefinite form, never valid in DER.
    let count = (first & 0x7F) as usize;
    if count == 0 || count > MAX_LENGTH_OCTETS {
        return Err(DerError::BadLength);
    }
    let octets = data.get(1..1 + count).ok_or(DerError::Truncated)?;

    let len = octets
        .iter()
        .fold(0usize, |acc, &b| (acc << 8) | b as usize);
    Ok((len, 1 + count))
}

/// Parse the TLV at the start of `data`, requiring `tag`.
fn expect_tlv(data: &[u8], tag: u8) -> Result<Tlv<'_>, DerError> {
    let found = *data.first().ok_or(DerError::Truncated)?;
    if found != tag {
        return Err(DerError::UnexpectedTag {
            expected: tag,
            found,
        });
    }
    parse_tlv(data)
}

/// Skip one element with the given tag, returning what follows it.
fn skip(data: &[u8], tag: u8) -> Result<&[u8], DerError> {
    let tlv = expect_tlv(data, tag)?;
    Ok(&data[tlv.raw.len()..])
}

/// Borrow the SPKI TLV out of a DER-encoded certificate.
pub fn spki_span(cert_der: &[u8]) -> Result<&[u8], DerError> {
    let certificate = expect_tlv(cert_der, TAG_SEQUENCE)?;
    if certificate.raw.len() != cert_der.len() {
        return Err(DerError::TrailingData);
    }

    let tbs = expect_tlv(certificate.value, TAG_SEQUENCE)?;
    let mut pos = tbs.value;

    if pos.first() == Some(&TAG_CONTEXT_0) {
        pos = skip(pos, TAG_CONTEXT_0)?;
    }
    pos = skip(pos, TAG_INTEGER)?; // serialNumber
    pos = skip(pos, TAG_SEQUENCE)?; // signature
    pos = skip(pos, TAG_SEQUENCE)?; // issuer
    pos = skip(pos, TAG_SEQUENCE)?; // validity
    pos = skip(pos, TAG_SEQUENCE)?; // subject

    let spki = expect_tlv(pos, TAG_SEQUENCE)?;
    Ok(spki.raw)
}

/// Extract the SPKI of a DER-encoded certificate as an owned buffer.
pub fn extract_spki(cert_der: &[u8]) -> Result<Vec<u8>, DerError> {
    spki_span(cert_der).map(<[u8]>::to_vec)
}

/// Check that `spki` is exactly one SubjectPublicKeyInfo structure
/// (`SEQUENCE { AlgorithmIdentifier, BIT STRING }`) and return it.
pub fn parse_spki(spki: &[u8]) -> Result<&[u8], DerError> {
    let outer = expect_tlv(spki, TAG_SEQUENCE)?;
    if outer.raw.len() != spki.len() {
        return Err(DerError::TrailingData);
    }

    let rest = skip(outer.value, TAG_SEQUENCE)?;
    let key_bits = expect_tlv(rest, TAG_BIT_STRING)?;
    if key_bits.raw.len() != rest.len() {
        return Err(DerError::TrailingData);
    }
    // First content octet of a BIT STRING counts unused bits.
    if key_bits.value.is_empty() {
        return Err(DerError::Truncated);
    }

    Ok(outer.raw)
}

/// Input to SPKI extraction when the caller already knows what it holds.
#[derive(Debug, Clone, Copy)]
pub enum SpkiSource<'a> {
    /// A full DER-encoded X.509 certificate.
    Certificate(&'a [u8]),
    /// A bare DER-encoded SubjectPublicKeyInfo.
    SubjectPublicKeyInfo(&'a [u8]),
}

impl<'a> SpkiSource<'a> {
    pub fn spki(&self) -> Result<&'a [u8], DerError> {
        match *self {
            SpkiSource::Certificate(der) => spki_span(der),
            SpkiSource::SubjectPublicKeyInfo(der) => parse_spki(der),
        }
    }
}
