//! HKDF-SHA512 derivations used throughout pairing.
//!
//! Every HAP key is 32 bytes and derived from a `(salt, info)` label pair,
//! listed in [`Label`].

use hap_core::error::CryptoError;
use hkdf::Hkdf;
use sha2::Sha512;

/// Salt and info strings of each HAP derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    PairSetupEncrypt,
    PairSetupControllerSign,
    PairSetupAccessorySign,
    PairVerifyEncrypt,
    ControlWrite,
    ControlRead,
}

impl Label {
    pub fn salt(self) -> &'static [u8] {
        match self {
            Label::PairSetupEncrypt => b"Pair-Setup-Encrypt-Salt",
            Label::PairSetupControllerSign => b"Pair-Setup-Controller-Sign-Salt",
            Label::PairSetupAccessorySign => b"Pair-Setup-Accessory-Sign-Salt",
            Label::PairVerifyEncrypt => b"Pair-Verify-Encrypt-Salt",
            Label::ControlWrite | Label::ControlRead => b"Control-Salt",
        }
    }

    pub fn info(self) -> &'static [u8] {
        match self {
            Label::PairSetupEncrypt => b"Pair-Setup-Encrypt-Info",
            Label::PairSetupControllerSign => b"Pair-Setup-Controller-Sign-Info",
            Label::PairSetupAccessorySign => b"Pair-Setup-Accessory-Sign-Info",
            Label::PairVerifyEncrypt => b"Pair-Verify-Encrypt-Info",
            Label::ControlWrite => b"Control-Write-Encryption-Key",
            Label::ControlRead => b"Control-Read-Encryption-Key",
        }
    }

    /// 32 byte key for this label from `ikm`.
    pub fn derive(self, ikm: &[u8]) -> Result<[u8; 32], CryptoError> {
        let mut key = [0u8; 32];
        expand(ikm, self.salt(), self.info(), &mut key)?;
        Ok(key)
    }
}

/// Fill `okm` from `ikm`. Output is capped at 255 hash blocks.
pub fn expand(ikm: &[u8], salt: &[u8], info: &[u8], okm: &mut [u8]) -> Result<(), CryptoError> {
    Hkdf::<Sha512>::new(Some(salt), ikm)
        .expand(info, okm)
        .map_err(|_| CryptoError::KeyDerivation(format!("Cannot expand to {} bytes", okm.len())))
}

pub fn derive_key(ikm: &[u8], salt: &[u8], info: &[u8], length: usize) -> Result<Vec<u8>, CryptoError> {
    let mut okm = vec![0u8; length];
    expand(ikm, salt, info, &mut okm)?;
    Ok(okm)
}

/// Key sealing pair-setup M5 and M6.
pub fn derive_pair_setup_key(srp_key: &[u8]) -> Result<[u8; 32], CryptoError> {
    Label::PairSetupEncrypt.derive(srp_key)
}

/// iOSDeviceX, covered by the controller signature in M5.
pub fn derive_controller_sign_key(srp_key: &[u8]) -> Result<[u8; 32], CryptoError> {
    Label::PairSetupControllerSign.derive(srp_key)
}

/// AccessoryX, covered by the accessory signature in M6.
pub fn derive_accessory_sign_key(srp_key: &[u8]) -> Result<[u8; 32], CryptoError> {
    Label::PairSetupAccessorySign.derive(srp_key)
}

pub fn derive_pair_verify_key(shared_secret: &[u8]) -> Result<[u8; 32], CryptoError> {
    Label::PairVerifyEncrypt.derive(shared_secret)
}

/// Controller to accessory direction.
pub fn derive_control_write_key(shared_secret: &[u8]) -> Result<[u8; 32], CryptoError> {
    Label::ControlWrite.derive(shared_secret)
}

/// Accessory to controller direction.
pub fn derive_control_read_key(shared_secret: &[u8]) -> Result<[u8; 32], CryptoError> {
    Label::ControlRead.derive(shared_secret)
}
