//! Accessory side of HomeKit pair-verify (M1-M4).
//!
//! Both sides exchange ephemeral X25519 keys and sign them with their
//! long-term Ed25519 keys. A successful exchange yields the control channel
//! keys for the rest of the connection.

use crate::identity::AccessoryIdentity;
use crate::pair_setup::error_response;
use crate::traits::{Pairing, PairingStore};
use hap_core::error::{Error, PairingError, Result};
use hap_crypto::{
    chacha::{decrypt_with_nonce, encrypt_with_nonce, nonce_from_string},
    curve25519::EcdhKeyPair,
    ed25519::verify,
    hkdf,
    keys::{SessionKeys, SharedSecret},
    tlv::{Tlv8, TlvError, TlvState, TlvType},
};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

const PV_MSG02_NONCE: &[u8] = b"PV-Msg02";
const PV_MSG03_NONCE: &[u8] = b"PV-Msg03";

/// Outcome of one pair-verify request.
pub enum VerifyStep {
    /// Send this body and wait for the next request.
    Continue(Vec<u8>),
    /// Send this body in plaintext, then switch the connection to the keys.
    Verified {
        response: Vec<u8>,
        keys: SessionKeys,
        controller: Pairing,
    },
}

enum VerifyState {
    AwaitingM1,
    AwaitingM3 {
        shared_secret: Zeroizing<[u8; 32]>,
        accessory_public: [u8; 32],
        controller_public: [u8; 32],
    },
}

/// Pair-verify state of one connection.
pub struct PairVerify {
    state: VerifyState,
}

impl Default for PairVerify {
    fn default() -> Self {
        Self::new()
    }
}

impl PairVerify {
    pub fn new() -> Self {
        Self {
            state: VerifyState::AwaitingM1,
        }
    }

    pub fn state(&self) -> &'static str {
        match self.state {
            VerifyState::AwaitingM1 => "awaiting_m1",
            VerifyState::AwaitingM3 { .. } => "awaiting_m3",
        }
    }

    pub fn reset(&mut self) {
        self.state = VerifyState::AwaitingM1;
    }

    /// Process one `/pair-verify` request body.
    pub async fn handle(
        &mut self,
        request: &[u8],
        identity: &AccessoryIdentity,
        store: &dyn PairingStore,
    ) -> Result<VerifyStep> {
        let state = std::mem::replace(&mut self.state, VerifyState::AwaitingM1);
        let tlv = Tlv8::parse(request)?;

        match (tlv.state().and_then(TlvState::from_byte), state) {
            (Some(TlvState::M1), _) => self.process_m1(&tlv, identity).map(VerifyStep::Continue),
            (
                Some(TlvState::M3),
                VerifyState::AwaitingM3 {
                    shared_secret,
                    accessory_public,
                    controller_public,
                },
            ) => {
                process_m3(
                    &tlv,
                    &shared_secret,
                    &accessory_public,
                    &controller_public,
                    store,
                )
                .await
            }
            (state, _) => {
                warn!(?state, "Unexpected pair-verify request");
                Err(Error::invalid_state("Unknown data received"))
            }
        }
    }

    fn process_m1(&mut self, tlv: &Tlv8, identity: &AccessoryIdentity) -> Result<Vec<u8>> {
        let controller_public: [u8; 32] = tlv
            .get_bytes(TlvType::PublicKey)
            .ok_or(PairingError::MissingTlv(TlvType::PublicKey as u8))?
            .try_into()
            .map_err(|_| PairingError::Protocol("Invalid ephemeral key length".to_string()))?;

        let ephemeral = EcdhKeyPair::generate();
        let accessory_public = ephemeral.public_key();
        let shared_secret = Zeroizing::new(ephemeral.diffie_hellman(&controller_public)?);

        // AccessoryInfo = AccessoryPK || AccessoryPairingID || iOSDevicePK
        let mut info = Vec::with_capacity(64 + identity.device_id_bytes().len());
        info.extend_from_slice(&accessory_public);
        info.extend_from_slice(identity.device_id_bytes());
        info.extend_from_slice(&controller_public);

        let sub_tlv = Tlv8::new()
            .with_text(TlvType::Identifier, identity.device_id())
            .with_bytes(TlvType::Signature, identity.sign(&info).to_vec())
            .encode()?;

        let session_key = hkdf::derive_pair_verify_key(&shared_secret[..])?;
        let encrypted =
            encrypt_with_nonce(&session_key, &nonce_from_string(PV_MSG02_NONCE), &sub_tlv)?;

        let response = Tlv8::new()
            .with_state(TlvState::M2)
            .with_bytes(TlvType::PublicKey, accessory_public.to_vec())
            .with_bytes(TlvType::EncryptedData, encrypted)
            .encode()?;

        debug!("Pair-verify M2 sent");
        self.state = VerifyState::AwaitingM3 {
            shared_secret,
            accessory_public,
            controller_public,
        };
        Ok(response)
    }
}

async fn process_m3(
    tlv: &Tlv8,
    shared_secret: &[u8; 32],
    accessory_public: &[u8; 32],
    controller_public: &[u8; 32],
    store: &dyn PairingStore,
) -> Result<VerifyStep> {
    let rejected = || error_response(TlvState::M4, TlvError::Authentication).map(VerifyStep::Continue);

    let encrypted = tlv
        .get_bytes(TlvType::EncryptedData)
        .ok_or(PairingError::MissingTlv(TlvType::EncryptedData as u8))?;

    let session_key = hkdf::derive_pair_verify_key(shared_secret)?;
    let decrypted =
        match decrypt_with_nonce(&session_key, &nonce_from_string(PV_MSG03_NONCE), encrypted) {
            Ok(decrypted) => decrypted,
            Err(e) => {
                warn!(error = %e, "Pair-verify M3 decryption failed");
                return rejected();
            }
        };

    let sub_tlv = Tlv8::parse(&decrypted)?;
    let identifier = sub_tlv
        .get_text(TlvType::Identifier)
        .ok_or(PairingError::MissingTlv(TlvType::Identifier as u8))?;
    let signature = sub_tlv
        .get_bytes(TlvType::Signature)
        .ok_or(PairingError::MissingTlv(TlvType::Signature as u8))?;

    let Some(pairing) = store.get(identifier).await? else {
        warn!(identifier, "Pair-verify from unknown controller");
        return rejected();
    };

    // iOSDeviceInfo = iOSDevicePK || iOSDevicePairingID || AccessoryPK
    let mut info = Vec::with_capacity(64 + identifier.len());
    info.extend_from_slice(controller_public);
    info.extend_from_slice(identifier.as_bytes());
    info.extend_from_slice(accessory_public);

    if let Err(e) = verify(&pairing.public_key, &info, signature) {
        warn!(identifier, error = %e, "Pair-verify controller signature invalid");
        return rejected();
    }

    let keys = SessionKeys::derive_control_keys(&SharedSecret::new(shared_secret.to_vec()))?;
    let response = Tlv8::new().with_state(TlvState::M4).encode()?;

    info!(identifier, admin = pairing.is_admin(), "Controller verified");
    Ok(VerifyStep::Verified {
        response,
        keys,
        controller: pairing,
    })
}
