//! Magic-link token codec.
//!
//! Token layout: `base64url(JSON claims) "." base64url(HMAC-SHA256(secret,
//! payload))`, URL-path-safe end to end. Verification recomputes the MAC
//! and compares in constant time before looking at expiry.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Disambiguates collisions between tokens issued for the same intent
/// within the same second.
const NONCE_LEN: usize = 21;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenCodecError {
    #[error("malformed token")]
    Malformed,
    #[error("token signature mismatch")]
    BadSignature,
    #[error("token expired")]
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(rename = "intentId")]
    pub intent_id: i64,
    pub iat: i64,
    pub exp: i64,
    pub nonce: String,
}

fn mac(secret: &str, payload_b64: &str) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(payload_b64.as_bytes());
    mac
}

/// Sign a new token for `intent_id`, valid for `ttl_secs` from `now`.
pub fn issue(intent_id: i64, secret: &str, ttl_secs: i64, now: DateTime<Utc>) -> String {
    let nonce: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect();

    let claims = TokenClaims {
        intent_id,
        iat: now.timestamp(),
        exp: now.timestamp() + ttl_secs,
        nonce,
    };

    let payload_b64 =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).expect("claims serialize"));
    let signature = mac(secret, &payload_b64).finalize().into_bytes();

    format!("{}.{}", payload_b64, URL_SAFE_NO_PAD.encode(signature))
}

/// Verify signature and expiry, returning the embedded claims.
pub fn decode(
    token: &str,
    secret: &str,
    now: DateTime<Utc>,
) -> Result<TokenClaims, TokenCodecError> {
    let (payload_b64, sig_b64) = token.rsplit_once('.').ok_or(TokenCodecError::Malformed)?;

    let signature = URL_SAFE_NO_PAD
        .decode(sig_b64)
        .map_err(|_| TokenCodecError::Malformed)?;

    mac(secret, payload_b64)
        .verify_slice(&signature)
        .map_err(|_| TokenCodecError::BadSignature)?;

    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| TokenCodecError::Malformed)?;
    let claims: TokenClaims =
        serde_json::from_slice(&payload).map_err(|_| TokenCodecError::Malformed)?;

    if now.timestamp() >= claims.exp {
        return Err(TokenCodecError::Expired);
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const SECRET: &str = "an-adequately-long-test-secret-value";

    #[test]
    fn round_trip() {
        let now = Utc::now();
        let token = issue(42, SECRET, 3600, now);
        let claims = decode(&token, SECRET, now).unwrap();
        assert_eq!(claims.intent_id, 42);
        assert_eq!(claims.exp, now.timestamp() + 3600);
        assert_eq!(claims.nonce.len(), NONCE_LEN);
    }

    #[test]
    fn token_is_url_path_safe() {
        let token = issue(7, SECRET, 3600, Utc::now());
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'));
    }

    #[test]
    fn rejects_wrong_secret() {
        let now = Utc::now();
        let token = issue(1, SECRET, 3600, now);
        assert_eq!(
            decode(&token, "some-other-secret", now).unwrap_err(),
            TokenCodecError::BadSignature
        );
    }

    #[test]
    fn rejects_tampered_payload() {
        let now = Utc::now();
        let token = issue(1, SECRET, 3600, now);
        let (_, sig) = token.rsplit_once('.').unwrap();
        let forged_payload = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&TokenClaims {
                intent_id: 2,
                iat: now.timestamp(),
                exp: now.timestamp() + 3600,
                nonce: "x".repeat(NONCE_LEN),
            })
            .unwrap(),
        );
        assert_eq!(
            decode(&format!("{}.{}", forged_payload, sig), SECRET, now).unwrap_err(),
            TokenCodecError::BadSignature
        );
    }

    #[test]
    fn rejects_expired() {
        let issued = Utc::now();
        let token = issue(1, SECRET, 60, issued);
        // still valid one second before exp
        assert!(decode(&token, SECRET, issued + Duration::seconds(59)).is_ok());
        // rejected at and after exp
        assert_eq!(
            decode(&token, SECRET, issued + Duration::seconds(60)).unwrap_err(),
            TokenCodecError::Expired
        );
    }

    #[test]
    fn rejects_garbage() {
        let now = Utc::now();
        for bad in ["", "no-dot-here", "a.b", "!!.!!"] {
            let err = decode(bad, SECRET, now).unwrap_err();
            assert!(
                matches!(err, TokenCodecError::Malformed | TokenCodecError::BadSignature),
                "{bad:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn same_second_tokens_differ() {
        let now = Utc::now();
        assert_ne!(issue(1, SECRET, 3600, now), issue(1, SECRET, 3600, now));
    }
}
