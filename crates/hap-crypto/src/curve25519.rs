//! X25519 key agreement used by pair-verify.

use hap_core::error::CryptoError;
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};

/// Accessory ephemeral key for a single pair-verify exchange.
///
/// The secret is wiped when the pair is dropped.
pub struct EcdhKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl EcdhKeyPair {
    pub fn generate() -> Self {
        Self::from_static(StaticSecret::random_from_rng(OsRng))
    }

    /// Rebuild a key pair from a raw scalar, mainly for known-answer tests.
    pub fn from_secret(secret: &[u8; 32]) -> Self {
        Self::from_static(StaticSecret::from(*secret))
    }

    fn from_static(secret: StaticSecret) -> Self {
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Shared secret with the controller's ephemeral key.
    ///
    /// Fails for a zero key or any low-order point, both of which force
    /// the shared secret to zero.
    pub fn diffie_hellman(&self, peer_public: &[u8; 32]) -> Result<[u8; 32], CryptoError> {
        if *peer_public == [0u8; 32] {
            return Err(CryptoError::KeyDerivation(
                "Controller public key is zero".to_string(),
            ));
        }

        let shared = self.secret.diffie_hellman(&PublicKey::from(*peer_public));
        if !shared.was_contributory() {
            return Err(CryptoError::KeyDerivation(
                "Controller public key has low order".to_string(),
            ));
        }
        Ok(shared.to_bytes())
    }
}

impl std::fmt::Debug for EcdhKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcdhKeyPair")
            .field("public", &self.public.as_bytes())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(hex_str: &str) -> [u8; 32] {
        hex::decode(hex_str).unwrap().try_into().unwrap()
    }

    #[test]
    fn fresh_keys_differ() {
        assert_ne!(
            EcdhKeyPair::generate().public_key(),
            EcdhKeyPair::generate().public_key()
        );
    }

    #[test]
    fn agreement_is_symmetric() {
        let accessory = EcdhKeyPair::generate();
        let controller = EcdhKeyPair::generate();

        assert_eq!(
            accessory.diffie_hellman(&controller.public_key()).unwrap(),
            controller.diffie_hellman(&accessory.public_key()).unwrap()
        );
    }

    #[test]
    fn degenerate_peer_keys_are_refused() {
        let accessory = EcdhKeyPair::generate();
        assert!(accessory.diffie_hellman(&[0u8; 32]).is_err());

        // u = 1 has order one.
        let mut identity_point = [0u8; 32];
        identity_point[0] = 1;
        assert!(matches!(
            accessory.diffie_hellman(&identity_point),
            Err(CryptoError::KeyDerivation(_))
        ));
    }

    #[test]
    fn debug_shows_public_half_only() {
        let pair = EcdhKeyPair::from_secret(&[7u8; 32]);
        let rendered = format!("{:?}", pair);
        assert!(rendered.contains("public"));
        assert!(!rendered.contains("secret"));
    }

    // RFC 7748, section 6.1.
    #[test]
    fn rfc7748_vector() {
        let alice = EcdhKeyPair::from_secret(&bytes(
            "77076d0a7318a57d3c16c17251b26645df4c2f87ebc0992ab177fba51db92c2a",
        ));
        let bob = EcdhKeyPair::from_secret(&bytes(
            "5dab087e624a8a4b79e17f8b83800ee66f3bb1292618b6fd1c2f8b27ff88e0eb",
        ));

        assert_eq!(
            alice.public_key(),
            bytes("8520f0098930a754748b7ddcb43ef75a0dbf3a0d26381af4eba4a98eaa9b4e6a")
        );
        assert_eq!(
            alice.diffie_hellman(&bob.public_key()).unwrap(),
            bytes("4a5d9d5ba4ce2de1728e3bf480350f25e07e21c947d19e3376f09b3c1e161742")
        );
    }
}
