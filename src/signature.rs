//! Payment provider webhook signature verification.
//!
//! The provider sends `Stripe-Signature: t=<unix>,v1=<hex>[,v1=<hex>...]`.
//! The signed payload is `"{t}.{raw body}"`, signed with HMAC-SHA256 using the
//! endpoint secret. Verification must run against the raw, unparsed body.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::errors::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the provider signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Parsed signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    /// Decoded `v1` signatures; any one matching is enough.
    pub signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, AppError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => {
                    timestamp = Some(value.parse::<i64>().map_err(|_| {
                        AppError::SignatureInvalid("Unable to extract timestamp".to_string())
                    })?)
                }
                "v1" => {
                    // Undecodable entries cannot match; skip instead of failing the header.
                    if let Ok(bytes) = hex::decode(value) {
                        signatures.push(bytes);
                    }
                }
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| {
            AppError::SignatureInvalid("Unable to extract timestamp and signatures".to_string())
        })?;
        if signatures.is_empty() {
            return Err(AppError::SignatureInvalid(
                "No signatures found with expected scheme".to_string(),
            ));
        }

        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

fn mac_for(payload: &[u8], secret: &str, timestamp: i64) -> HmacSha256 {
    // HMAC accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC takes any key size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac
}

/// Hex HMAC-SHA256 of `"{timestamp}.{payload}"`.
pub fn compute_signature(payload: &[u8], secret: &str, timestamp: i64) -> String {
    hex::encode(mac_for(payload, secret, timestamp).finalize().into_bytes())
}

/// Full header value for a payload, as the provider would send it.
pub fn signature_header(payload: &[u8], secret: &str, timestamp: i64) -> String {
    format!(
        "t={},v1={}",
        timestamp,
        compute_signature(payload, secret, timestamp)
    )
}

/// Verifies `header` against the raw `payload`.
///
/// Rejects a missing header, a header without timestamp or `v1` entries, a
/// timestamp further than `tolerance_secs` from `now`, and any payload whose
/// HMAC matches none of the `v1` entries. Comparison is constant time.
pub fn verify(
    payload: &[u8],
    header: Option<&str>,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<(), AppError> {
    let header = header
        .filter(|h| !h.trim().is_empty())
        .ok_or_else(|| AppError::SignatureInvalid("Missing Stripe-Signature header".to_string()))?;
    let parsed = SignatureHeader::parse(header)?;

    if now.abs_diff(parsed.timestamp) > tolerance_secs.unsigned_abs() {
        return Err(AppError::SignatureInvalid(
            "Timestamp outside the tolerance zone".to_string(),
        ));
    }

    let matched = parsed
        .signatures
        .iter()
        .any(|candidate| mac_for(payload, secret, parsed.timestamp).verify_slice(candidate).is_ok());

    if !matched {
        return Err(AppError::SignatureInvalid(
            "No signatures found matching the expected signature for payload".to_string(),
        ));
    }

    Ok(())
}
