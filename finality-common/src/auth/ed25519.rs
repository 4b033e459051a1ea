use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;

use super::{AuthError, Authenticator};

pub struct Ed25519Authenticator {
    keypair: SigningKey,
}

impl Ed25519Authenticator {
    pub fn new(keypair: SigningKey) -> Self {
        Self { keypair }
    }

    /// Generates a fresh key from the OS RNG.
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        Self::new(SigningKey::generate(&mut csprng))
    }

    /// Loads a key from its 32-byte seed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AuthError> {
        let seed: &[u8; 32] = bytes
            .try_into()
            .map_err(|_| AuthError::InvalidSecretKey("invalid key length".to_string()))?;
        Ok(Self { keypair: SigningKey::from_bytes(seed) })
    }
}

impl Authenticator for Ed25519Authenticator {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, AuthError> {
        let signature = self.keypair.sign(message);
        Ok(signature.to_bytes().to_vec())
    }

    fn public_key(&self) -> Vec<u8> {
        self.keypair.verifying_key().to_bytes().to_vec()
    }
}
