//! Security utilities: admin key hashing and processor event signatures.
//!
//! Processor events carry a `Processor-Signature` header of the form
//! `t=<unix seconds>,v1=<hex hmac>`, where the HMAC-SHA256 is computed with the
//! shared webhook secret over `"<t>.<raw body>"`.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use splits_types::SignatureVerifier;

type HmacSha256 = Hmac<Sha256>;

/// Seconds a signed event stays acceptable.
pub const DEFAULT_SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Hashes an API key using SHA-256.
pub fn hash_api_key(key: &str) -> String {
    let hash = Sha256::digest(key.as_bytes());
    hex::encode(hash)
}

/// Verifies an API key against a stored hash using constant-time comparison.
pub fn verify_api_key(input: &str, stored_hash: &str) -> bool {
    let input_hash = hash_api_key(input);
    input_hash.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

/// Computes the hex HMAC of an event body signed at `timestamp`.
pub fn sign_event_payload(payload: &[u8], timestamp: i64, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Builds a complete signature header value for `payload`.
pub fn signature_header(payload: &[u8], timestamp: i64, secret: &str) -> String {
    format!(
        "t={},v1={}",
        timestamp,
        sign_event_payload(payload, timestamp, secret)
    )
}

/// Verifies a signature header against `payload`.
///
/// Fails on a malformed header, a timestamp further than `tolerance_secs`
/// from `now`, or when no `v1` entry matches.
pub fn verify_event_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> bool {
    let mut timestamp = None;
    let mut candidates = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let Some(timestamp) = timestamp else {
        return false;
    };
    if (now - timestamp).abs() > tolerance_secs {
        return false;
    }

    let expected = sign_event_payload(payload, timestamp, secret);
    candidates
        .iter()
        .any(|candidate| bool::from(expected.as_bytes().ct_eq(candidate.as_bytes())))
}

/// HMAC-SHA256 implementation of the signature verifier port.
pub struct HmacSignatureVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl HmacSignatureVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: DEFAULT_SIGNATURE_TOLERANCE_SECS,
        }
    }

    pub fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }
}

impl SignatureVerifier for HmacSignatureVerifier {
    fn verify(&self, payload: &[u8], signature: &str) -> bool {
        verify_event_signature(
            payload,
            signature,
            &self.secret,
            self.tolerance_secs,
            chrono::Utc::now().timestamp(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    #[test]
    fn test_api_key_hashing() {
        let key = "admin_key_abc123";
        let hash = hash_api_key(key);

        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_api_key(key));
    }

    #[test]
    fn test_api_key_verification() {
        let key = "admin_key_abc123";
        let hash = hash_api_key(key);

        assert!(verify_api_key(key, &hash));
        assert!(!verify_api_key("wrong_key", &hash));
    }

    #[test]
    fn test_event_signature_roundtrip() {
        let payload = br#"{"id":"evt_1","type":"payment_intent.succeeded"}"#;
        let now = 1_700_000_000;
        let header = signature_header(payload, now, SECRET);

        assert!(verify_event_signature(payload, &header, SECRET, 300, now));
        assert!(!verify_event_signature(payload, &header, "whsec_other", 300, now));
        assert!(!verify_event_signature(b"tampered", &header, SECRET, 300, now));
    }

    #[test]
    fn test_stale_signature_rejected() {
        let payload = b"{}";
        let header = signature_header(payload, 1_700_000_000, SECRET);

        assert!(verify_event_signature(payload, &header, SECRET, 300, 1_700_000_300));
        assert!(!verify_event_signature(payload, &header, SECRET, 300, 1_700_000_301));
    }

    #[test]
    fn test_malformed_header_rejected() {
        let payload = b"{}";
        assert!(!verify_event_signature(payload, "", SECRET, 300, 0));
        assert!(!verify_event_signature(payload, "v1=abcd", SECRET, 300, 0));
        assert!(!verify_event_signature(payload, "t=abc,v1=abcd", SECRET, 300, 0));
    }

    #[test]
    fn test_any_matching_v1_accepted() {
        let payload = b"{}";
        let now = 1_700_000_000;
        let valid = sign_event_payload(payload, now, SECRET);
        let header = format!("t={},v1=deadbeef,v1={}", now, valid);

        assert!(verify_event_signature(payload, &header, SECRET, 300, now));
    }

    #[test]
    fn test_verifier_port_uses_current_time() {
        let payload = b"{}";
        let header = signature_header(payload, chrono::Utc::now().timestamp(), SECRET);
        let verifier = HmacSignatureVerifier::new(SECRET);

        assert!(verifier.verify(payload, &header));
        assert!(!verifier.verify(payload, "t=1,v1=00"));
    }
}
