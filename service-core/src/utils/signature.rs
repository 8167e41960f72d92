//! Timestamped HMAC-SHA256 webhook signatures.
//!
//! Header format: `t=<unix seconds>,v1=<hex digest>[,v1=<hex digest>...]`,
//! where each digest is `HMAC-SHA256("{t}.{payload}", secret)`. Several `v1`
//! entries may be present while a signing secret is being rotated.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Default tolerance between the signed timestamp and the local clock.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Malformed signature header")]
    MalformedHeader,

    #[error("Signature timestamp outside tolerance")]
    TimestampOutOfTolerance,

    #[error("No matching signature found")]
    Mismatch,

    #[error("Invalid signing key")]
    InvalidKey,
}

/// Compute the hex digest for `payload` signed at `timestamp`.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &str) -> Result<String, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Build a complete signature header, as the sender would.
pub fn signature_header(
    secret: &str,
    timestamp: i64,
    payload: &str,
) -> Result<String, SignatureError> {
    Ok(format!(
        "t={},v1={}",
        timestamp,
        sign_payload(secret, timestamp, payload)?
    ))
}

/// Verify `header` against `payload` using constant-time comparison.
///
/// `now` is the verifier's clock in unix seconds.
pub fn verify_signature_header(
    secret: &str,
    header: &str,
    payload: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = Some(
                    value
                        .parse()
                        .map_err(|_| SignatureError::MalformedHeader)?,
                )
            }
            "v1" => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
    if candidates.is_empty() {
        return Err(SignatureError::MalformedHeader);
    }

    if now.abs_diff(timestamp) > tolerance_secs.unsigned_abs() {
        return Err(SignatureError::TimestampOutOfTolerance);
    }

    let expected = sign_payload(secret, timestamp, payload)?;
    let expected_bytes = expected.as_bytes();

    let matched = candidates.iter().any(|candidate| {
        let candidate_bytes = candidate.as_bytes();
        candidate_bytes.len() == expected_bytes.len()
            && bool::from(candidate_bytes.ct_eq(expected_bytes))
    });

    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}
