//! `/pairings` administration: list, add and remove controllers.

use crate::pair_setup::error_response;
use crate::traits::{Pairing, PairingStore};
use hap_core::error::{Error, PairingError, Result};
use hap_core::ClientPermission;
use hap_crypto::tlv::{self, Tlv8, TlvError, TlvMethod, TlvState, TlvType};
use tracing::{debug, info, warn};

enum Request {
    List,
    Add(Pairing),
    Remove(String),
}

impl Request {
    fn parse(body: &[u8]) -> Result<Self> {
        let tlv = Tlv8::parse(body)?;

        if tlv.state() != Some(TlvState::M1 as u8) {
            return Err(PairingError::StateMismatch {
                expected: TlvState::M1 as u8,
                actual: tlv.state().unwrap_or(0),
            }
            .into());
        }

        let identifier = || {
            tlv.get_text(TlvType::Identifier)
                .map(str::to_string)
                .ok_or(PairingError::MissingTlv(TlvType::Identifier as u8))
        };

        match tlv.method().and_then(TlvMethod::from_byte) {
            Some(TlvMethod::ListPairings) => Ok(Request::List),
            Some(TlvMethod::RemovePairing) => Ok(Request::Remove(identifier()?)),
            Some(TlvMethod::AddPairing) => {
                let public_key: [u8; 32] = tlv
                    .get_bytes(TlvType::PublicKey)
                    .ok_or(PairingError::MissingTlv(TlvType::PublicKey as u8))?
                    .try_into()
                    .map_err(|_| PairingError::Protocol("Invalid LTPK length".to_string()))?;
                let permission = tlv
                    .get_integer(TlvType::Permissions)
                    .and_then(ClientPermission::from_byte)
                    .ok_or(PairingError::MissingTlv(TlvType::Permissions as u8))?;

                Ok(Request::Add(Pairing::new(identifier()?, public_key, permission)))
            }
            method => Err(Error::invalid_state(format!(
                "Unsupported pairings method: {:?}",
                method
            ))),
        }
    }
}

/// Handle one `/pairings` request from the verified `controller`.
///
/// Only admins may manage pairings. Rejections and store failures are
/// reported inside the TLV response; malformed bodies are errors.
pub async fn handle(
    body: &[u8],
    controller: Option<&Pairing>,
    store: &dyn PairingStore,
) -> Result<Vec<u8>> {
    let request = Request::parse(body)?;

    if !is_admin(controller, store).await {
        warn!(
            controller = controller.map(|c| c.identifier.as_str()),
            "Pairings request without admin rights"
        );
        return error_response(TlvState::M2, TlvError::Authentication);
    }

    match execute(request, store).await {
        Ok(response) => Ok(response),
        Err(e) => {
            warn!(error = %e, "Pairing store failure");
            error_response(TlvState::M2, TlvError::Unknown)
        }
    }
}

/// The session's controller must still be a stored admin of a paired bridge.
async fn is_admin(controller: Option<&Pairing>, store: &dyn PairingStore) -> bool {
    let Some(controller) = controller else {
        return false;
    };

    match (store.is_paired().await, store.get(&controller.identifier).await) {
        (Ok(true), Ok(Some(stored))) => stored.is_admin(),
        _ => false,
    }
}

async fn execute(request: Request, store: &dyn PairingStore) -> Result<Vec<u8>> {
    match request {
        Request::List => {
            let pairings = store.list().await?;
            debug!(count = pairings.len(), "Listing pairings");

            let records: Vec<Tlv8> = pairings
                .iter()
                .enumerate()
                .map(|(index, pairing)| {
                    let record = if index == 0 {
                        Tlv8::new().with_state(TlvState::M2)
                    } else {
                        Tlv8::new()
                    };
                    record
                        .with_text(TlvType::Identifier, pairing.identifier.clone())
                        .with_bytes(TlvType::PublicKey, pairing.public_key.to_vec())
                        .with_integer(TlvType::Permissions, pairing.permission as u8)
                })
                .collect();

            if records.is_empty() {
                return Tlv8::new().with_state(TlvState::M2).encode();
            }
            tlv::encode(&records)
        }
        Request::Add(pairing) => {
            if let Some(existing) = store.get(&pairing.identifier).await? {
                if existing.public_key != pairing.public_key {
                    warn!(identifier = %pairing.identifier, "Add pairing with a different LTPK");
                    return error_response(TlvState::M2, TlvError::Unknown);
                }
            }

            info!(identifier = %pairing.identifier, permission = ?pairing.permission, "Adding pairing");
            store.add(pairing).await?;
            Tlv8::new().with_state(TlvState::M2).encode()
        }
        Request::Remove(identifier) => {
            store.remove(&identifier).await?;
            info!(identifier, "Removed pairing");

            let remaining = store.list().await?;
            if !remaining.iter().any(Pairing::is_admin) {
                for pairing in &remaining {
                    store.remove(&pairing.identifier).await?;
                }
                store.set_paired(false).await?;
                info!("Last admin removed, bridge is unpaired");
            }

            Tlv8::new().with_state(TlvState::M2).encode()
        }
    }
}
