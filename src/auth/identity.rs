//! Signing identity for credential issuance
//!
//! The `IdentityClient` owns the issuer name and signing strategy. It is
//! constructed once at process start and injected into `TokenService` —
//! there is no global client state.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Marker emitted in place of a real signature in insecure mode
const INSECURE_SIGNATURE: &str = "insecure-demo-signature";

/// How credentials are signed and verified
#[derive(Clone)]
enum SigningStrategy {
    /// HMAC-SHA256 over `header.payload` with a shared key
    HmacSha256 { key: Vec<u8> },
    /// Structure and expiry checks only. Demo deployments only, never the
    /// default, requires explicit opt-in at construction.
    Insecure,
}

/// Issuer identity plus signing strategy, injected into `TokenService`
#[derive(Clone)]
pub struct IdentityClient {
    issuer: String,
    strategy: SigningStrategy,
}

impl IdentityClient {
    /// Create an identity that signs with HMAC-SHA256.
    ///
    /// The key must be non-empty; credential authenticity depends on it
    /// staying private to the deployment.
    pub fn new(issuer: impl Into<String>, key: impl Into<Vec<u8>>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(AppError::Validation("signing key must not be empty".to_string()));
        }
        Ok(Self {
            issuer: issuer.into(),
            strategy: SigningStrategy::HmacSha256 { key },
        })
    }

    /// Create an identity that does not sign credentials.
    ///
    /// Validation still checks structure and expiry but NOT authenticity.
    pub fn insecure(issuer: impl Into<String>) -> Self {
        tracing::warn!("credential signing disabled: tokens are NOT authenticated");
        Self {
            issuer: issuer.into(),
            strategy: SigningStrategy::Insecure,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Whether this identity produces verifiable signatures
    pub fn is_signed(&self) -> bool {
        matches!(self.strategy, SigningStrategy::HmacSha256 { .. })
    }

    /// Produce the base64url signature segment for `message`
    pub(crate) fn sign(&self, message: &[u8]) -> String {
        match &self.strategy {
            SigningStrategy::HmacSha256 { key } => {
                let mut mac =
                    HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
                mac.update(message);
                URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
            }
            SigningStrategy::Insecure => URL_SAFE_NO_PAD.encode(INSECURE_SIGNATURE),
        }
    }

    /// Verify the signature segment against `message`
    pub(crate) fn verify(&self, message: &[u8], signature: &str) -> bool {
        match &self.strategy {
            SigningStrategy::HmacSha256 { key } => {
                let decoded = match URL_SAFE_NO_PAD.decode(signature) {
                    Ok(bytes) => bytes,
                    Err(_) => return false,
                };
                let mut mac =
                    HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
                mac.update(message);
                mac.verify_slice(&decoded).is_ok()
            }
            SigningStrategy::Insecure => {
                signature == URL_SAFE_NO_PAD.encode(INSECURE_SIGNATURE)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_empty_key() {
        assert!(IdentityClient::new("dispatch", Vec::new()).is_err());
    }

    #[test]
    fn test_hmac_sign_verify() {
        let identity = IdentityClient::new("dispatch", b"secret-key".to_vec()).unwrap();
        let sig = identity.sign(b"header.payload");
        assert!(identity.verify(b"header.payload", &sig));
    }

    #[test]
    fn test_hmac_rejects_tampered_message() {
        let identity = IdentityClient::new("dispatch", b"secret-key".to_vec()).unwrap();
        let sig = identity.sign(b"header.payload");
        assert!(!identity.verify(b"header.payload2", &sig));
    }

    #[test]
    fn test_hmac_rejects_wrong_key() {
        let a = IdentityClient::new("dispatch", b"key-a".to_vec()).unwrap();
        let b = IdentityClient::new("dispatch", b"key-b".to_vec()).unwrap();
        let sig = a.sign(b"message");
        assert!(!b.verify(b"message", &sig));
    }

    #[test]
    fn test_hmac_rejects_garbage_signature() {
        let identity = IdentityClient::new("dispatch", b"secret".to_vec()).unwrap();
        assert!(!identity.verify(b"message", "!!not-base64!!"));
        assert!(!identity.verify(b"message", ""));
    }

    #[test]
    fn test_insecure_mode_round_trip() {
        let identity = IdentityClient::insecure("dispatch");
        let sig = identity.sign(b"anything");
        assert!(identity.verify(b"anything", &sig));
        assert!(!identity.is_signed());
    }

    #[test]
    fn test_insecure_signature_does_not_pass_hmac() {
        let insecure = IdentityClient::insecure("dispatch");
        let signed = IdentityClient::new("dispatch", b"secret".to_vec()).unwrap();
        let sig = insecure.sign(b"message");
        assert!(!signed.verify(b"message", &sig));
    }

    #[test]
    fn test_issuer() {
        let identity = IdentityClient::new("dispatch-test", b"k".to_vec()).unwrap();
        assert_eq!(identity.issuer(), "dispatch-test");
        assert!(identity.is_signed());
    }
}
