//! HMAC-SHA256 device token issuance and verification.
//!
//! Stateless: the token carries only a signature and a timestamp, never the
//! device identity it was signed for — `client_id`/`username` travel
//! alongside the token on the wire (header or MQTT connect triple) and are
//! re-supplied to [`AuthVerifier::verify`].

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_EXPIRE_SECONDS: i64 = 60 * 60 * 24 * 30;

/// HMAC-SHA256 token signer/verifier over `client_id|username|timestamp`.
#[derive(Clone)]
pub struct AuthVerifier {
    secret_key: String,
    expire_seconds: i64,
}

impl AuthVerifier {
    /// `expire_seconds <= 0` falls back to the 30-day default.
    #[must_use]
    pub fn new(secret_key: impl Into<String>, expire_seconds: i64) -> Self {
        Self {
            secret_key: secret_key.into(),
            expire_seconds: if expire_seconds <= 0 {
                DEFAULT_EXPIRE_SECONDS
            } else {
                expire_seconds
            },
        }
    }

    fn sign(&self, content: &str) -> String {
        // HMAC key setup never fails: HMAC-SHA256 accepts keys of any length.
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC-SHA256 accepts a key of any length");
        mac.update(content.as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    /// `sig = HMAC_SHA256(secret, client_id|username|now)`; token =
    /// `base64url_nopad(sig) + "." + unix_seconds`.
    #[must_use]
    pub fn generate(&self, client_id: &str, username: &str, now_unix: i64) -> String {
        let content = format!("{client_id}|{username}|{now_unix}");
        let signature = self.sign(&content);
        format!("{signature}.{now_unix}")
    }

    /// Any parse/format problem yields `false` — this never propagates an
    /// error to the caller.
    #[must_use]
    pub fn verify(&self, token: &str, client_id: &str, username: &str, now_unix: i64) -> bool {
        self.try_verify(token, client_id, username, now_unix)
            .unwrap_or(false)
    }

    fn try_verify(&self, token: &str, client_id: &str, username: &str, now_unix: i64) -> Option<bool> {
        let (sig_part, ts_str) = token.split_once('.')?;
        let ts: i64 = ts_str.parse().ok()?;
        if now_unix - ts > self.expire_seconds {
            return Some(false);
        }
        let expected = self.sign(&format!("{client_id}|{username}|{ts}"));
        // Constant-time comparison: verification must not branch on, or
        // short-circuit over, the signature bytes.
        Some(constant_time_eq(sig_part.as_bytes(), expected.as_bytes()))
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_format_matches_signature_dot_timestamp() {
        let verifier = AuthVerifier::new("k", 0);
        let token = verifier.generate("C", "D", 1_000_000);
        assert!(token.ends_with(".1000000"));
        assert_eq!(token.matches('.').count(), 1);
    }

    #[test]
    fn round_trip_verifies_true() {
        let verifier = AuthVerifier::new("k", 0);
        let token = verifier.generate("C", "D", 1_000_000);
        assert!(verifier.verify(&token, "C", "D", 1_000_000));
    }

    #[test]
    fn verify_fails_on_mismatched_identity() {
        let verifier = AuthVerifier::new("k", 0);
        let token = verifier.generate("C", "D", 1_000_000);
        assert!(!verifier.verify(&token, "C", "E", 1_000_000));
    }

    #[test]
    fn verify_fails_once_expired() {
        let verifier = AuthVerifier::new("k", 0);
        let token = verifier.generate("C", "D", 1_000_000);
        let expired_now = 1_000_000 + 31 * 86_400;
        assert!(!verifier.verify(&token, "C", "D", expired_now));
    }

    #[test]
    fn verify_never_panics_on_garbage_input() {
        let verifier = AuthVerifier::new("k", 0);
        assert!(!verifier.verify("not-a-token", "C", "D", 0));
        assert!(!verifier.verify("sig.not-a-number", "C", "D", 0));
        assert!(!verifier.verify("", "C", "D", 0));
    }

    #[test]
    fn non_positive_expire_seconds_falls_back_to_default() {
        let verifier = AuthVerifier::new("k", -5);
        assert_eq!(verifier.expire_seconds, DEFAULT_EXPIRE_SECONDS);
    }
}
