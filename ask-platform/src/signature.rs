use ring::signature::{ED25519, UnparsedPublicKey};
use thiserror::Error;

const ED25519_PUBLIC_KEY_LEN: usize = 32;
const ED25519_SIGNATURE_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("public key is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("public key must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Authenticates an inbound webhook request.
pub trait SignatureVerifier: Send + Sync {
    /// `true` only when `signature` is valid for `timestamp || body`.
    fn verify(&self, body: &[u8], signature: &str, timestamp: &str) -> bool;
}

#[derive(Debug, Clone)]
pub struct Ed25519Verifier {
    public_key: Vec<u8>,
}

impl Ed25519Verifier {
    pub fn from_hex(public_key_hex: &str) -> Result<Self, SignatureError> {
        let public_key = hex::decode(public_key_hex.trim())?;
        if public_key.len() != ED25519_PUBLIC_KEY_LEN {
            return Err(SignatureError::InvalidLength {
                expected: ED25519_PUBLIC_KEY_LEN,
                actual: public_key.len(),
            });
        }
        Ok(Self { public_key })
    }
}

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, body: &[u8], signature: &str, timestamp: &str) -> bool {
        let Ok(signature) = hex::decode(signature.trim()) else {
            return false;
        };
        if signature.len() != ED25519_SIGNATURE_LEN {
            return false;
        }
        let mut message = Vec::with_capacity(timestamp.len() + body.len());
        message.extend_from_slice(timestamp.as_bytes());
        message.extend_from_slice(body);
        UnparsedPublicKey::new(&ED25519, &self.public_key)
            .verify(&message, &signature)
            .is_ok()
    }
}
