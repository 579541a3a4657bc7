//! Long-term identity of the accessory.
//!
//! Controllers remember the accessory by its device id and Ed25519 public
//! key. Both must survive restarts, otherwise every controller has to pair
//! again.

use hap_core::error::{Error, Result};
use hap_core::DeviceId;
use hap_crypto::ed25519::IdentityKeyPair;
use std::path::Path;
use tracing::info;

#[derive(Clone)]
pub struct AccessoryIdentity {
    /// Device id in "AA:BB:CC:DD:EE:FF" form, used as the pairing identifier.
    device_id: String,
    keypair: IdentityKeyPair,
}

impl AccessoryIdentity {
    pub fn generate(device_id: DeviceId) -> Self {
        Self::from_keypair(device_id, IdentityKeyPair::generate())
    }

    pub fn from_keypair(device_id: DeviceId, keypair: IdentityKeyPair) -> Self {
        Self {
            device_id: device_id.to_mac_string(),
            keypair,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn device_id_bytes(&self) -> &[u8] {
        self.device_id.as_bytes()
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.keypair.public_key()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.keypair.sign(message)
    }

    /// Load the signing seed from a file holding 64 hex digits.
    pub fn load(device_id: DeviceId, path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let seed = hex::decode(contents.trim())
            .map_err(|e| Error::invalid_state(format!("Invalid identity file: {}", e)))?;

        let seed: [u8; 32] = seed.as_slice().try_into().map_err(|_| {
            Error::invalid_state(format!("Identity seed must be 32 bytes, got {}", seed.len()))
        })?;

        Ok(Self::from_keypair(device_id, IdentityKeyPair::from_seed(&seed)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, format!("{}\n", hex::encode(self.keypair.seed())))?;
        Ok(())
    }

    /// Load the identity, or create and save a new one when the file is missing.
    pub fn load_or_generate(device_id: DeviceId, path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(device_id, path)
        } else {
            let identity = Self::generate(device_id);
            identity.save(path)?;
            info!(path = %path.display(), "Generated accessory identity");
            Ok(identity)
        }
    }
}

impl std::fmt::Debug for AccessoryIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessoryIdentity")
            .field("device_id", &self.device_id)
            .finish_non_exhaustive()
    }
}
