//! ES256 tokens for the VAPID `Authorization` header (RFC 8292).

use base64::{URL_SAFE_NO_PAD, encode_config};
use p256::ecdsa::DerSignature;
use p256::ecdsa::signature::Signer;
use reqwest::Url;
use serde::Serialize;
use time::{Duration, OffsetDateTime};

use crate::error::SigningError;
use crate::push::vapid::VapidKeys;

/// Push services reject tokens that live longer than 24 hours.
pub const TOKEN_TTL: Duration = Duration::hours(12);

const COMPONENT_LEN: usize = 32;
const RAW_SIGNATURE_LEN: usize = COMPONENT_LEN * 2;

#[derive(Serialize)]
struct Header {
    typ: &'static str,
    alg: &'static str,
}

#[derive(Serialize)]
struct Claims<'a> {
    aud: &'a str,
    exp: i64,
    sub: &'a str,
}

/// Origin of a push endpoint, used as the token audience.
pub fn audience_for(endpoint: &str) -> Result<String, SigningError> {
    let url = Url::parse(endpoint).map_err(|_| SigningError::InvalidAudience(endpoint.into()))?;
    let host = url
        .host_str()
        .ok_or_else(|| SigningError::InvalidAudience(endpoint.into()))?;
    Ok(match url.port() {
        Some(port) => format!("{}://{host}:{port}", url.scheme()),
        None => format!("{}://{host}", url.scheme()),
    })
}

pub fn authorization_header(token: &str, public_key: &str) -> String {
    format!("vapid t={token}, k={public_key}")
}

#[derive(Debug, Clone)]
pub struct VapidSigner {
    keys: VapidKeys,
}

impl VapidSigner {
    pub fn new(keys: VapidKeys) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &VapidKeys {
        &self.keys
    }

    pub fn sign(&self, audience: &str, now: OffsetDateTime) -> Result<String, SigningError> {
        let header = serde_json::to_vec(&Header {
            typ: "JWT",
            alg: "ES256",
        })?;
        let claims = serde_json::to_vec(&Claims {
            aud: audience,
            exp: (now + TOKEN_TTL).unix_timestamp(),
            sub: self.keys.subject(),
        })?;
        let signing_input = format!(
            "{}.{}",
            encode_config(header, URL_SAFE_NO_PAD),
            encode_config(claims, URL_SAFE_NO_PAD)
        );

        let signature: DerSignature = self.keys.signing_key().sign(signing_input.as_bytes());
        let raw = der_to_raw(signature.as_bytes())?;

        Ok(format!(
            "{signing_input}.{}",
            encode_config(raw, URL_SAFE_NO_PAD)
        ))
    }
}

/// Converts an ECDSA signature into the fixed-width `r || s` form JWS requires.
///
/// A 64 byte input is already raw and is returned unchanged. Anything else must
/// be a DER `SEQUENCE { INTEGER r, INTEGER s }`.
pub fn normalize_signature(signature: &[u8]) -> Result<[u8; RAW_SIGNATURE_LEN], SigningError> {
    if signature.len() == RAW_SIGNATURE_LEN {
        let mut raw = [0u8; RAW_SIGNATURE_LEN];
        raw.copy_from_slice(signature);
        return Ok(raw);
    }
    der_to_raw(signature)
}

/// Strict DER decoding. A DER signature can itself be 64 bytes long, so the
/// signer calls this directly instead of [`normalize_signature`].
fn der_to_raw(signature: &[u8]) -> Result<[u8; RAW_SIGNATURE_LEN], SigningError> {
    let mut raw = [0u8; RAW_SIGNATURE_LEN];
    let (tag, body, rest) = der_element(signature)?;
    if tag != 0x30 || !rest.is_empty() {
        return Err(SigningError::MalformedSignature("expected a single SEQUENCE"));
    }
    let (tag, r, rest) = der_element(body)?;
    if tag != 0x02 {
        return Err(SigningError::MalformedSignature("r is not an INTEGER"));
    }
    let (tag, s, rest) = der_element(rest)?;
    if tag != 0x02 || !rest.is_empty() {
        return Err(SigningError::MalformedSignature("s is not a trailing INTEGER"));
    }

    left_pad_into(&mut raw[..COMPONENT_LEN], r)?;
    left_pad_into(&mut raw[COMPONENT_LEN..], s)?;
    Ok(raw)
}

/// Splits one DER element off the front of `input`: (tag, contents, remainder).
fn der_element(input: &[u8]) -> Result<(u8, &[u8], &[u8]), SigningError> {
    let [tag, first_len, rest @ ..] = input else {
        return Err(SigningError::MalformedSignature("truncated element"));
    };
    let (len, rest) = match *first_len {
        len @ 0..=0x7f => (usize::from(len), rest),
        0x81 => match rest {
            [len, rest @ ..] => (usize::from(*len), rest),
            [] => return Err(SigningError::MalformedSignature("truncated length")),
        },
        _ => return Err(SigningError::MalformedSignature("unsupported length form")),
    };
    if rest.len() < len {
        return Err(SigningError::MalformedSignature("length exceeds input"));
    }
    let (contents, remainder) = rest.split_at(len);
    Ok((*tag, contents, remainder))
}

fn left_pad_into(out: &mut [u8], integer: &[u8]) -> Result<(), SigningError> {
    let first_significant = integer
        .iter()
        .position(|byte| *byte != 0)
        .unwrap_or(integer.len());
    let significant = &integer[first_significant..];
    if significant.len() > out.len() {
        return Err(SigningError::MalformedSignature("integer wider than 32 bytes"));
    }
    let offset = out.len() - significant.len();
    out[..offset].fill(0);
    out[offset..].copy_from_slice(significant);
    Ok(())
}
