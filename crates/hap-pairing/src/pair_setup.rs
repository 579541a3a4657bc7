//! Accessory side of HomeKit pair-setup (M1-M6).
//!
//! The controller proves knowledge of the setup code through SRP-6a, then
//! both sides exchange their Ed25519 long-term public keys inside a payload
//! encrypted with a key derived from the SRP session key.

use crate::identity::AccessoryIdentity;
use crate::traits::{Pairing, PairingStore};
use hap_core::error::{Error, PairingError, Result};
use hap_core::ClientPermission;
use hap_crypto::{
    chacha::{decrypt_with_nonce, encrypt_with_nonce, nonce_from_string},
    ed25519::verify,
    hkdf,
    srp::SrpServer,
    tlv::{Tlv8, TlvError, TlvState, TlvType},
};
use tracing::{debug, info, warn};

const SETUP_USERNAME: &[u8] = b"Pair-Setup";

const PS_MSG05_NONCE: &[u8] = b"PS-Msg05";
const PS_MSG06_NONCE: &[u8] = b"PS-Msg06";

/// Build `{state, error}` for a rejected pairing step.
pub fn error_response(state: TlvState, error: TlvError) -> Result<Vec<u8>> {
    Tlv8::new().with_state(state).with_error(error).encode()
}

enum SetupState {
    AwaitingM1,
    AwaitingM3(SrpServer),
    AwaitingM5(SrpServer),
}

/// Pair-setup state of one connection.
pub struct PairSetup {
    state: SetupState,
}

impl Default for PairSetup {
    fn default() -> Self {
        Self::new()
    }
}

impl PairSetup {
    pub fn new() -> Self {
        Self {
            state: SetupState::AwaitingM1,
        }
    }

    pub fn state(&self) -> &'static str {
        match self.state {
            SetupState::AwaitingM1 => "awaiting_m1",
            SetupState::AwaitingM3(_) => "awaiting_m3",
            SetupState::AwaitingM5(_) => "awaiting_m5",
        }
    }

    pub fn reset(&mut self) {
        self.state = SetupState::AwaitingM1;
    }

    /// Process one `/pair-setup` request body and return the response body.
    ///
    /// Every rejection leaves the exchange waiting for a new M1. Requests
    /// that fit no step of the exchange fail with `InvalidState`.
    pub async fn handle(
        &mut self,
        request: &[u8],
        pin: &str,
        identity: &AccessoryIdentity,
        store: &dyn PairingStore,
    ) -> Result<Vec<u8>> {
        let state = std::mem::replace(&mut self.state, SetupState::AwaitingM1);
        let tlv = Tlv8::parse(request)?;

        match (tlv.state().and_then(TlvState::from_byte), state) {
            (Some(TlvState::M1), _) => self.process_m1(pin, store).await,
            (Some(TlvState::M3), SetupState::AwaitingM3(srp)) => self.process_m3(&tlv, srp),
            (Some(TlvState::M5), SetupState::AwaitingM5(srp)) => {
                process_m5(&tlv, &srp, identity, store).await
            }
            (state, _) => {
                warn!(?state, "Unexpected pair-setup request");
                Err(Error::invalid_state("Unknown data received"))
            }
        }
    }

    async fn process_m1(&mut self, pin: &str, store: &dyn PairingStore) -> Result<Vec<u8>> {
        if store.is_paired().await? {
            info!("Pair-setup refused, accessory is already paired");
            return error_response(TlvState::M2, TlvError::Unavailable);
        }

        let srp = SrpServer::new(SETUP_USERNAME, pin.as_bytes());
        let response = Tlv8::new()
            .with_state(TlvState::M2)
            .with_bytes(TlvType::Salt, srp.salt())
            .with_bytes(TlvType::PublicKey, srp.public_key())
            .encode()?;

        debug!("Pair-setup M2 sent");
        self.state = SetupState::AwaitingM3(srp);
        Ok(response)
    }

    fn process_m3(&mut self, tlv: &Tlv8, mut srp: SrpServer) -> Result<Vec<u8>> {
        let client_public = tlv
            .get_bytes(TlvType::PublicKey)
            .ok_or(PairingError::MissingTlv(TlvType::PublicKey as u8))?;
        let client_proof = tlv
            .get_bytes(TlvType::Proof)
            .ok_or(PairingError::MissingTlv(TlvType::Proof as u8))?;

        if let Err(e) = srp.compute_session_key(client_public) {
            warn!(error = %e, "Pair-setup rejected client public key");
            return error_response(TlvState::M4, TlvError::Authentication);
        }

        if !srp.verify_proof(client_proof) {
            warn!("Pair-setup client proof mismatch, wrong setup code");
            return error_response(TlvState::M4, TlvError::Authentication);
        }

        let server_proof = srp
            .server_proof()
            .ok_or_else(|| PairingError::InvalidState("SRP proof not computed".to_string()))?;

        let response = Tlv8::new()
            .with_state(TlvState::M4)
            .with_bytes(TlvType::Proof, server_proof)
            .encode()?;

        debug!("Pair-setup M4 sent");
        self.state = SetupState::AwaitingM5(srp);
        Ok(response)
    }
}

async fn process_m5(
    tlv: &Tlv8,
    srp: &SrpServer,
    identity: &AccessoryIdentity,
    store: &dyn PairingStore,
) -> Result<Vec<u8>> {
    let encrypted = tlv
        .get_bytes(TlvType::EncryptedData)
        .ok_or(PairingError::MissingTlv(TlvType::EncryptedData as u8))?;
    let session_key = srp
        .session_key()
        .ok_or_else(|| PairingError::InvalidState("SRP session key not derived".to_string()))?;

    let encryption_key = hkdf::derive_pair_setup_key(session_key)?;

    let decrypted = match decrypt_with_nonce(
        &encryption_key,
        &nonce_from_string(PS_MSG05_NONCE),
        encrypted,
    ) {
        Ok(decrypted) => decrypted,
        Err(e) => {
            warn!(error = %e, "Pair-setup M5 decryption failed");
            return error_response(TlvState::M6, TlvError::Authentication);
        }
    };

    let sub_tlv = Tlv8::parse(&decrypted)?;
    let identifier = sub_tlv
        .get_text(TlvType::Identifier)
        .ok_or(PairingError::MissingTlv(TlvType::Identifier as u8))?;
    let ltpk = sub_tlv
        .get_bytes(TlvType::PublicKey)
        .ok_or(PairingError::MissingTlv(TlvType::PublicKey as u8))?;
    let signature = sub_tlv
        .get_bytes(TlvType::Signature)
        .ok_or(PairingError::MissingTlv(TlvType::Signature as u8))?;

    // iOSDeviceInfo = iOSDeviceX || iOSDevicePairingID || iOSDeviceLTPK
    let controller_x = hkdf::derive_controller_sign_key(session_key)?;
    let mut device_info = Vec::with_capacity(32 + identifier.len() + ltpk.len());
    device_info.extend_from_slice(&controller_x);
    device_info.extend_from_slice(identifier.as_bytes());
    device_info.extend_from_slice(ltpk);

    if let Err(e) = verify(ltpk, &device_info, signature) {
        warn!(identifier, error = %e, "Pair-setup controller signature invalid");
        return error_response(TlvState::M6, TlvError::Authentication);
    }

    let public_key: [u8; 32] = ltpk
        .try_into()
        .map_err(|_| PairingError::Protocol(format!("Invalid LTPK length: {}", ltpk.len())))?;

    store
        .add(Pairing::new(identifier, public_key, ClientPermission::Admin))
        .await?;
    store.set_paired(true).await?;

    // AccessoryInfo = AccessoryX || AccessoryPairingID || AccessoryLTPK
    let accessory_x = hkdf::derive_accessory_sign_key(session_key)?;
    let accessory_ltpk = identity.public_key();
    let mut accessory_info = Vec::with_capacity(32 + identity.device_id_bytes().len() + 32);
    accessory_info.extend_from_slice(&accessory_x);
    accessory_info.extend_from_slice(identity.device_id_bytes());
    accessory_info.extend_from_slice(&accessory_ltpk);

    let sub_response = Tlv8::new()
        .with_text(TlvType::Identifier, identity.device_id())
        .with_bytes(TlvType::PublicKey, accessory_ltpk.to_vec())
        .with_bytes(TlvType::Signature, identity.sign(&accessory_info).to_vec())
        .encode()?;

    let encrypted = encrypt_with_nonce(
        &encryption_key,
        &nonce_from_string(PS_MSG06_NONCE),
        &sub_response,
    )?;

    info!(identifier, "Controller paired");

    Tlv8::new()
        .with_state(TlvState::M6)
        .with_bytes(TlvType::EncryptedData, encrypted)
        .encode()
}
