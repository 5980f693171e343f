//! Webhook signature verification
//!
//! LINE signs each webhook delivery with HMAC-SHA256 over the exact
//! raw request body, base64-encoded into the `x-line-signature`
//! header. Verification must run on the raw bytes before any JSON
//! parsing; a mismatch rejects the whole batch.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature
pub const SIGNATURE_HEADER: &str = "x-line-signature";

/// Verify a webhook body signature.
///
/// Returns `false` for an empty secret, an empty header, or a
/// mismatch. Comparison is constant-time.
#[must_use]
pub fn verify(channel_secret: &str, body: &[u8], signature: &str) -> bool {
    if channel_secret.is_empty() || signature.is_empty() {
        return false;
    }

    let Ok(mut mac) = HmacSha256::new_from_slice(channel_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let computed = BASE64.encode(mac.finalize().into_bytes());

    computed.as_bytes().ct_eq(signature.as_bytes()).unwrap_u8() == 1
}

/// Compute the signature for a body; used by tests to build valid
/// webhook requests.
#[must_use]
pub fn sign(channel_secret: &str, body: &[u8]) -> String {
    HmacSha256::new_from_slice(channel_secret.as_bytes()).map_or_else(
        |_| String::new(),
        |mut mac| {
            mac.update(body);
            BASE64.encode(mac.finalize().into_bytes())
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_signature_accepted() {
        let secret = "test-secret";
        let body = br#"{"events":[]}"#;
        let sig = sign(secret, body);
        assert!(verify(secret, body, &sig));
    }

    #[test]
    fn tampered_body_rejected() {
        let secret = "test-secret";
        let sig = sign(secret, br#"{"events":[]}"#);
        assert!(!verify(secret, br#"{"events":[{}]}"#, &sig));
    }

    #[test]
    fn wrong_secret_rejected() {
        let body = b"payload";
        let sig = sign("secret-a", body);
        assert!(!verify("secret-b", body, &sig));
    }

    #[test]
    fn empty_inputs_rejected() {
        assert!(!verify("", b"payload", "sig"));
        assert!(!verify("secret", b"payload", ""));
    }
}
