//! HMAC-SHA256 signature verification with replay protection.
//!
//! Two schemes share one implementation:
//! - **Timestamped** (trigger surface): the MAC covers
//!   `"{timestamp}.{body}"` and the timestamp must be within a bounded skew
//!   of the server clock.
//! - **BodyOnly** (webhook surface): the MAC covers the raw body; an
//!   optional `sha256=` prefix on the signature is accepted.
//!
//! Comparison is constant time (via the hmac crate's `verify_slice`), and
//! the MAC check always runs even when the timestamp is stale so callers
//! cannot tell the two failure modes apart by timing or by error shape.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use agentry_core::signature::SignatureVerifier;
use agentry_types::error::SignatureError;

type HmacSha256 = Hmac<Sha256>;

/// What the MAC covers and whether a replay window applies.
#[derive(Debug, Clone, Copy)]
enum Scheme {
    Timestamped { max_skew_seconds: i64 },
    BodyOnly,
}

/// HMAC-SHA256 verifier over a shared secret.
pub struct HmacSignatureVerifier {
    secret: SecretString,
    scheme: Scheme,
}

impl HmacSignatureVerifier {
    /// Trigger-surface verifier: signs `"{timestamp}.{body}"`, rejects
    /// timestamps outside `max_skew_seconds` of now.
    pub fn timestamped(secret: SecretString, max_skew_seconds: i64) -> Self {
        Self {
            secret,
            scheme: Scheme::Timestamped { max_skew_seconds },
        }
    }

    /// Webhook-surface verifier: signs the raw body alone.
    pub fn body_only(secret: SecretString) -> Self {
        Self {
            secret,
            scheme: Scheme::BodyOnly,
        }
    }

    fn mac_matches(&self, message: &[u8], signature_hex: &str) -> Result<bool, SignatureError> {
        let Ok(expected) = hex_decode(signature_hex) else {
            return Ok(false);
        };
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|e| SignatureError::InvalidKey(e.to_string()))?;
        mac.update(message);
        Ok(mac.verify_slice(&expected).is_ok())
    }
}

impl SignatureVerifier for HmacSignatureVerifier {
    fn verify(
        &self,
        timestamp: Option<&str>,
        raw_body: &[u8],
        signature: &str,
    ) -> Result<(), SignatureError> {
        match self.scheme {
            Scheme::Timestamped { max_skew_seconds } => {
                let Some(ts) = timestamp else {
                    return Err(SignatureError::Rejected);
                };

                let mut message = Vec::with_capacity(ts.len() + 1 + raw_body.len());
                message.extend_from_slice(ts.as_bytes());
                message.push(b'.');
                message.extend_from_slice(raw_body);

                // Evaluate both checks unconditionally, then combine: the
                // caller sees one opaque rejection either way.
                let mac_ok = self.mac_matches(&message, signature)?;
                let fresh = match ts.parse::<i64>() {
                    Ok(ts_secs) => {
                        (chrono::Utc::now().timestamp() - ts_secs).abs() <= max_skew_seconds
                    }
                    Err(_) => false,
                };

                if mac_ok && fresh {
                    Ok(())
                } else {
                    tracing::debug!(mac_ok, fresh, "signature verification failed");
                    Err(SignatureError::Rejected)
                }
            }
            Scheme::BodyOnly => {
                let hex_sig = signature.strip_prefix("sha256=").unwrap_or(signature);
                if self.mac_matches(raw_body, hex_sig)? {
                    Ok(())
                } else {
                    Err(SignatureError::Rejected)
                }
            }
        }
    }
}

/// Compute the hex signature for a timestamped message. Used by clients
/// and by tests to produce valid vectors.
pub fn sign_timestamped(
    secret: &str,
    timestamp: &str,
    body: &[u8],
) -> Result<String, SignatureError> {
    let mut message = Vec::with_capacity(timestamp.len() + 1 + body.len());
    message.extend_from_slice(timestamp.as_bytes());
    message.push(b'.');
    message.extend_from_slice(body);
    compute_hmac_hex(secret.as_bytes(), &message)
}

/// Compute the hex signature over a raw body (webhook scheme).
pub fn sign_body(secret: &str, body: &[u8]) -> Result<String, SignatureError> {
    compute_hmac_hex(secret.as_bytes(), body)
}

fn compute_hmac_hex(secret: &[u8], message: &[u8]) -> Result<String, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| SignatureError::InvalidKey(e.to_string()))?;
    mac.update(message);
    Ok(hex_encode(&mac.finalize().into_bytes()))
}

fn hex_decode(hex: &str) -> Result<Vec<u8>, ()> {
    if hex.len() % 2 != 0 {
        return Err(());
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| ()))
        .collect()
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    fn now_ts() -> String {
        chrono::Utc::now().timestamp().to_string()
    }

    // -------------------------------------------------------------------
    // Timestamped scheme (trigger surface)
    // -------------------------------------------------------------------

    #[test]
    fn test_timestamped_valid() {
        let verifier = HmacSignatureVerifier::timestamped(secret("trigger-secret"), 300);
        let ts = now_ts();
        let body = br#"{"request_id":"abc"}"#;
        let sig = sign_timestamped("trigger-secret", &ts, body).unwrap();

        assert!(verifier.verify(Some(&ts), body, &sig).is_ok());
    }

    #[test]
    fn test_timestamped_wrong_signature() {
        let verifier = HmacSignatureVerifier::timestamped(secret("trigger-secret"), 300);
        let ts = now_ts();
        assert!(verifier
            .verify(Some(&ts), b"body", "deadbeef")
            .is_err());
    }

    #[test]
    fn test_timestamped_wrong_secret() {
        let verifier = HmacSignatureVerifier::timestamped(secret("trigger-secret"), 300);
        let ts = now_ts();
        let sig = sign_timestamped("other-secret", &ts, b"body").unwrap();
        assert!(verifier.verify(Some(&ts), b"body", &sig).is_err());
    }

    #[test]
    fn test_timestamped_tampered_body() {
        let verifier = HmacSignatureVerifier::timestamped(secret("trigger-secret"), 300);
        let ts = now_ts();
        let sig = sign_timestamped("trigger-secret", &ts, b"original").unwrap();
        assert!(verifier.verify(Some(&ts), b"tampered", &sig).is_err());
    }

    #[test]
    fn test_stale_timestamp_rejected_even_with_valid_mac() {
        let verifier = HmacSignatureVerifier::timestamped(secret("trigger-secret"), 300);
        let stale = (chrono::Utc::now().timestamp() - 301).to_string();
        let sig = sign_timestamped("trigger-secret", &stale, b"body").unwrap();

        let err = verifier.verify(Some(&stale), b"body", &sig).unwrap_err();
        // Indistinguishable from a bad signature
        assert_eq!(err.to_string(), "signature rejected");
    }

    #[test]
    fn test_future_timestamp_rejected() {
        let verifier = HmacSignatureVerifier::timestamped(secret("trigger-secret"), 300);
        let future = (chrono::Utc::now().timestamp() + 301).to_string();
        let sig = sign_timestamped("trigger-secret", &future, b"body").unwrap();
        assert!(verifier.verify(Some(&future), b"body", &sig).is_err());
    }

    #[test]
    fn test_skew_boundary_accepted() {
        let verifier = HmacSignatureVerifier::timestamped(secret("trigger-secret"), 300);
        let edge = (chrono::Utc::now().timestamp() - 299).to_string();
        let sig = sign_timestamped("trigger-secret", &edge, b"body").unwrap();
        assert!(verifier.verify(Some(&edge), b"body", &sig).is_ok());
    }

    #[test]
    fn test_non_numeric_timestamp_rejected() {
        let verifier = HmacSignatureVerifier::timestamped(secret("trigger-secret"), 300);
        let sig = sign_timestamped("trigger-secret", "yesterday", b"body").unwrap();
        assert!(verifier.verify(Some("yesterday"), b"body", &sig).is_err());
    }

    #[test]
    fn test_missing_timestamp_rejected() {
        let verifier = HmacSignatureVerifier::timestamped(secret("trigger-secret"), 300);
        assert!(verifier.verify(None, b"body", "cafe").is_err());
    }

    #[test]
    fn test_timestamp_is_bound_into_mac() {
        // A signature computed for one timestamp must not validate for another.
        let verifier = HmacSignatureVerifier::timestamped(secret("trigger-secret"), 300);
        let ts_a = now_ts();
        let ts_b = (chrono::Utc::now().timestamp() - 5).to_string();
        let sig = sign_timestamped("trigger-secret", &ts_a, b"body").unwrap();
        assert!(verifier.verify(Some(&ts_b), b"body", &sig).is_err());
    }

    // -------------------------------------------------------------------
    // BodyOnly scheme (webhook surface)
    // -------------------------------------------------------------------

    #[test]
    fn test_body_only_valid() {
        let verifier = HmacSignatureVerifier::body_only(secret("webhook-secret"));
        let body = br#"{"runId":"abc","status":"COMPLETED"}"#;
        let sig = sign_body("webhook-secret", body).unwrap();
        assert!(verifier.verify(None, body, &sig).is_ok());
    }

    #[test]
    fn test_body_only_with_sha256_prefix() {
        let verifier = HmacSignatureVerifier::body_only(secret("webhook-secret"));
        let body = b"payload data";
        let sig = sign_body("webhook-secret", body).unwrap();
        assert!(verifier.verify(None, body, &format!("sha256={sig}")).is_ok());
    }

    #[test]
    fn test_body_only_invalid() {
        let verifier = HmacSignatureVerifier::body_only(secret("webhook-secret"));
        assert!(verifier.verify(None, b"payload", "not-hex").is_err());
        assert!(verifier
            .verify(None, b"payload", "deadbeefcafebabe")
            .is_err());
    }

    #[test]
    fn test_secrets_are_independent() {
        // A valid trigger signature must not pass webhook verification.
        let webhook = HmacSignatureVerifier::body_only(secret("webhook-secret"));
        let sig = sign_body("trigger-secret", b"body").unwrap();
        assert!(webhook.verify(None, b"body", &sig).is_err());
    }

    // -------------------------------------------------------------------
    // Known vectors (RFC 4231)
    // -------------------------------------------------------------------

    #[test]
    fn test_hmac_sha256_rfc4231_vector1() {
        let key = vec![0x0b_u8; 20];
        let expected = "b0344c61d8db38535ca8afceaf0bf12b881dc200c9833da726e9376c2e32cff7";
        let computed = compute_hmac_hex(&key, b"Hi There").unwrap();
        assert_eq!(computed, expected);
    }

    #[test]
    fn test_hmac_sha256_rfc4231_vector2() {
        let expected = "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843";
        let computed = compute_hmac_hex(b"Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(computed, expected);
    }

    // -------------------------------------------------------------------
    // hex helpers
    // -------------------------------------------------------------------

    #[test]
    fn test_hex_roundtrip() {
        let data = b"Hello, World!";
        assert_eq!(hex_decode(&hex_encode(data)).unwrap(), data);
    }

    #[test]
    fn test_hex_decode_invalid() {
        assert!(hex_decode("0").is_err());
        assert!(hex_decode("zz").is_err());
    }
}
