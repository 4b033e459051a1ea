//! Signing capability of the local BP and signature verification.

pub mod ed25519;

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use thiserror::Error;

pub use self::ed25519::Ed25519Authenticator;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid signature encoding: {0}")]
    InvalidSignature(String),

    #[error("invalid secret key: {0}")]
    InvalidSecretKey(String),

    #[error("signing failed: {0}")]
    Signing(String),
}

/// The local node's identity key, used to sign vote digests.
pub trait Authenticator: Send + Sync {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, AuthError>;

    /// Raw ed25519 public key bytes.
    fn public_key(&self) -> Vec<u8>;
}

/// Verifies `signature` over `message` under a raw ed25519 `public_key`.
///
/// Malformed keys or signatures are errors; a well-formed signature that does
/// not match yields `Ok(false)`.
pub fn verify_with_key(message: &[u8], signature: &[u8], public_key: &[u8]) -> Result<bool, AuthError> {
    let key_bytes: &[u8; 32] = public_key
        .try_into()
        .map_err(|_| AuthError::InvalidPublicKey(format!("expected 32 bytes, got {}", public_key.len())))?;
    let verifying_key = VerifyingKey::from_bytes(key_bytes)
        .map_err(|e| AuthError::InvalidPublicKey(e.to_string()))?;
    let signature = Signature::from_slice(signature)
        .map_err(|e| AuthError::InvalidSignature(e.to_string()))?;

    Ok(verifying_key.verify(message, &signature).is_ok())
}
