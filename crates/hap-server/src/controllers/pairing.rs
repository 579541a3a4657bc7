//! `POST /pair-setup`, `POST /pair-verify` and `POST /pairings`.

use crate::http::HttpResponse;
use hap_core::error::Error;
use hap_crypto::SessionCipher;
use hap_pairing::{pairings, AccessoryIdentity, ConnectionSession, PairingStore, VerifyStep};
use tracing::{info, warn};

/// Reply of a pairing route.
pub enum PairingReply {
    Response(HttpResponse),
    /// Send the response in plaintext, then encrypt everything after it.
    Verified {
        response: HttpResponse,
        cipher: SessionCipher,
    },
}

impl PairingReply {
    pub fn response(&self) -> &HttpResponse {
        match self {
            Self::Response(response) | Self::Verified { response, .. } => response,
        }
    }
}

pub async fn pair_setup(
    session: &mut ConnectionSession,
    body: &[u8],
    pin: &str,
    identity: &AccessoryIdentity,
    store: &dyn PairingStore,
) -> HttpResponse {
    match session.setup.handle(body, pin, identity, store).await {
        Ok(response) => HttpResponse::tlv(response),
        Err(e) => rejected("pair-setup", e),
    }
}

pub async fn pair_verify(
    session: &mut ConnectionSession,
    body: &[u8],
    identity: &AccessoryIdentity,
    store: &dyn PairingStore,
) -> PairingReply {
    match session.verify.handle(body, identity, store).await {
        Ok(VerifyStep::Continue(response)) => PairingReply::Response(HttpResponse::tlv(response)),
        Ok(VerifyStep::Verified {
            response,
            keys,
            controller,
        }) => {
            info!(controller = %controller.identifier, "Controller verified");
            session.controller = Some(controller);
            PairingReply::Verified {
                response: HttpResponse::tlv(response),
                cipher: keys.accessory_cipher(),
            }
        }
        Err(e) => {
            session.verify.reset();
            PairingReply::Response(rejected("pair-verify", e))
        }
    }
}

pub async fn manage(session: &ConnectionSession, body: &[u8], store: &dyn PairingStore) -> HttpResponse {
    match pairings::handle(body, session.controller.as_ref(), store).await {
        Ok(response) => HttpResponse::tlv(response),
        Err(e) => rejected("pairings", e),
    }
}

fn rejected(route: &str, error: Error) -> HttpResponse {
    warn!(route, %error, "Pairing request rejected");
    HttpResponse::new(400)
}
