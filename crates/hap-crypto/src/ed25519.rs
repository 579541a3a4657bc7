//! Ed25519 long-term keys of the accessory and its controllers.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hap_core::error::CryptoError;
use rand::rngs::OsRng;

/// Accessory long-term key pair (LTSK and LTPK).
///
/// Only the 32 byte seed needs persisting; see [`IdentityKeyPair::seed`].
#[derive(Clone)]
pub struct IdentityKeyPair {
    signing: SigningKey,
}

impl IdentityKeyPair {
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(seed),
        }
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing.sign(message).to_bytes()
    }

    pub fn seed(&self) -> [u8; 32] {
        self.signing.to_bytes()
    }
}

impl std::fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("public", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Check `signature` over `message` against a controller or accessory LTPK.
///
/// Both inputs come straight out of TLV items, so their lengths are
/// validated here.
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let key_bytes: [u8; 32] = public_key
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyLength {
            expected: 32,
            actual: public_key.len(),
        })?;
    let signature = Signature::from_slice(signature)
        .map_err(|_| CryptoError::Decryption(format!("Signature has {} bytes", signature.len())))?;

    let key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| CryptoError::Decryption(format!("Unusable public key: {}", e)))?;
    key.verify(message, &signature)
        .map_err(|_| CryptoError::Decryption("Bad signature".to_string()))
}
