//! Keys of a verified control session.

use crate::chacha::SessionCipher;
use crate::hkdf;
use hap_core::error::CryptoError;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// ECDH output of pair-verify.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret(Vec<u8>);

impl SharedSecret {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Directional control channel keys.
///
/// HAP names the directions from the controller's point of view: it
/// writes with the write key and reads with the read key.
pub struct SessionKeys {
    read: Zeroizing<[u8; 32]>,
    write: Zeroizing<[u8; 32]>,
}

impl SessionKeys {
    pub fn derive_control_keys(shared_secret: &SharedSecret) -> Result<Self, CryptoError> {
        Ok(Self {
            read: Zeroizing::new(hkdf::derive_control_read_key(shared_secret.as_bytes())?),
            write: Zeroizing::new(hkdf::derive_control_write_key(shared_secret.as_bytes())?),
        })
    }

    /// Seals with the read key, opens with the write key.
    pub fn accessory_cipher(&self) -> SessionCipher {
        SessionCipher::new(*self.read, *self.write)
    }

    /// Seals with the write key, opens with the read key.
    pub fn controller_cipher(&self) -> SessionCipher {
        SessionCipher::new(*self.write, *self.read)
    }
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKeys { .. }")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> SessionKeys {
        SessionKeys::derive_control_keys(&SharedSecret::new(vec![0x42; 32])).unwrap()
    }

    #[test]
    fn directions_use_different_keys() {
        let keys = keys();
        assert_ne!(*keys.read, *keys.write);
    }

    #[test]
    fn both_ends_understand_each_other() {
        let keys = keys();
        let mut accessory = keys.accessory_cipher();
        let mut controller = keys.controller_cipher();

        let request = controller.encrypt(b"GET /accessories HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(
            accessory.decrypt(&request).unwrap().0,
            b"GET /accessories HTTP/1.1\r\n\r\n"
        );

        let response = accessory.encrypt(b"HTTP/1.1 204 No Content\r\n\r\n").unwrap();
        assert_eq!(
            controller.decrypt(&response).unwrap().0,
            b"HTTP/1.1 204 No Content\r\n\r\n"
        );
    }

    #[test]
    fn accessory_cannot_open_its_own_records() {
        let keys = keys();
        let mut accessory = keys.accessory_cipher();
        let sealed = accessory.encrypt(b"EVENT/1.0 200 OK\r\n\r\n").unwrap();

        let mut loopback = keys.accessory_cipher();
        assert!(loopback.decrypt(&sealed).is_err());
    }

    #[test]
    fn debug_hides_keys() {
        assert_eq!(format!("{:?}", keys()), "SessionKeys { .. }");
    }
}
