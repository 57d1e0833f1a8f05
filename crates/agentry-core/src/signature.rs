//! Signature verification seam.
//!
//! The HMAC-SHA256 implementation lives in agentry-infra; the dispatcher
//! and ingestor only see this trait so tests can substitute a static
//! verifier.

use agentry_types::error::SignatureError;

/// Verifies a request signature.
///
/// The trigger surface signs `"{timestamp}.{body}"` and enforces a bounded
/// replay window; the webhook surface signs the raw body alone, so
/// `timestamp` is `None` there. Implementations must compare in constant
/// time and must not let the caller distinguish a bad signature from a
/// stale timestamp (both are [`SignatureError::Rejected`]).
pub trait SignatureVerifier: Send + Sync {
    fn verify(
        &self,
        timestamp: Option<&str>,
        raw_body: &[u8],
        signature: &str,
    ) -> Result<(), SignatureError>;
}
