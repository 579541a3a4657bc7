//! Request dispatch and connection authorization.

use crate::controllers::{accessories, pairing, CharacteristicsController, PairingReply, ReadRequest};
use crate::http::{HttpRequest, HttpResponse, Method};
use crate::subscriber::Subscriber;
use crate::traits::DeviceExchange;
use hap_core::ServerStatus;
use hap_crypto::SessionCipher;
use hap_model::Bridge;
use hap_pairing::{AccessoryIdentity, PairingStore, SessionRegistry};
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Response plus the record layer to switch to after sending it.
pub struct Reply {
    pub response: HttpResponse,
    pub cipher: Option<SessionCipher>,
}

impl From<HttpResponse> for Reply {
    fn from(response: HttpResponse) -> Self {
        Self {
            response,
            cipher: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    PairSetup,
    PairVerify,
    Pairings,
    Identify,
    Accessories,
    ReadCharacteristics,
    WriteCharacteristics,
    Prepare,
}

impl Route {
    fn resolve(method: &Method, path: &str) -> Result<Self, u16> {
        let route = match (method, path) {
            (Method::Post, "/pair-setup") => Self::PairSetup,
            (Method::Post, "/pair-verify") => Self::PairVerify,
            (Method::Post, "/pairings") => Self::Pairings,
            (Method::Post, "/identify") => Self::Identify,
            (Method::Get, "/accessories") => Self::Accessories,
            (Method::Get, "/characteristics") => Self::ReadCharacteristics,
            (Method::Put, "/characteristics") => Self::WriteCharacteristics,
            (Method::Put, "/prepare") => Self::Prepare,
            (
                _,
                "/pair-setup" | "/pair-verify" | "/pairings" | "/identify" | "/accessories"
                | "/characteristics" | "/prepare",
            ) => return Err(405),
            _ => return Err(404),
        };
        Ok(route)
    }

    /// Routes served before pair-verify completes.
    fn is_public(&self) -> bool {
        matches!(self, Self::PairSetup | Self::PairVerify | Self::Identify)
    }
}

/// State shared by every connection of the server.
pub struct Router {
    bridge: Rc<RefCell<Bridge>>,
    subscriber: Rc<RefCell<Subscriber>>,
    sessions: RefCell<SessionRegistry>,
    characteristics: RefCell<CharacteristicsController>,
    identity: AccessoryIdentity,
    store: Arc<dyn PairingStore>,
    exchange: Arc<dyn DeviceExchange>,
    pin_code: String,
    paired: watch::Sender<bool>,
}

impl Router {
    pub fn new(
        bridge: Rc<RefCell<Bridge>>,
        subscriber: Rc<RefCell<Subscriber>>,
        identity: AccessoryIdentity,
        store: Arc<dyn PairingStore>,
        exchange: Arc<dyn DeviceExchange>,
        pin_code: impl Into<String>,
        paired: watch::Sender<bool>,
    ) -> Self {
        Self {
            bridge,
            subscriber,
            sessions: RefCell::new(SessionRegistry::default()),
            characteristics: RefCell::new(CharacteristicsController::new()),
            identity,
            store,
            exchange,
            pin_code: pin_code.into(),
            paired,
        }
    }

    pub fn subscriber(&self) -> &Rc<RefCell<Subscriber>> {
        &self.subscriber
    }

    /// Observe the paired flag, updated after every pairing change.
    pub fn paired(&self) -> watch::Receiver<bool> {
        self.paired.subscribe()
    }

    pub fn is_verified(&self, connection: u64) -> bool {
        self.sessions
            .borrow()
            .get(connection)
            .is_some_and(|session| session.is_verified())
    }

    /// Release everything a closed connection held.
    pub fn disconnect(&self, connection: u64) {
        self.sessions.borrow_mut().remove(connection);
        self.subscriber.borrow_mut().unregister(connection);
        self.characteristics.borrow_mut().forget(connection);
    }

    pub fn evict_expired_sessions(&self) -> usize {
        self.sessions.borrow_mut().evict_expired()
    }

    pub async fn handle(&self, connection: u64, request: HttpRequest) -> Reply {
        debug!(connection, method = request.method.as_str(), path = %request.path, "Request");

        let route = match Route::resolve(&request.method, &request.path) {
            Ok(route) => route,
            Err(status) => return HttpResponse::new(status).into(),
        };

        if !route.is_public() && !self.is_verified(connection) {
            warn!(connection, path = %request.path, "Request on unverified connection");
            return status_response(470, ServerStatus::InsufficientPrivileges).into();
        }

        match route {
            Route::PairSetup => {
                let mut session = self.sessions.borrow_mut().checkout(connection);
                let response = pairing::pair_setup(
                    &mut session,
                    &request.body,
                    &self.pin_code,
                    &self.identity,
                    self.store.as_ref(),
                )
                .await;
                self.sessions.borrow_mut().checkin(connection, session);
                self.refresh_paired().await;
                response.into()
            }
            Route::PairVerify => {
                let mut session = self.sessions.borrow_mut().checkout(connection);
                let reply = pairing::pair_verify(
                    &mut session,
                    &request.body,
                    &self.identity,
                    self.store.as_ref(),
                )
                .await;
                self.sessions.borrow_mut().checkin(connection, session);

                match reply {
                    PairingReply::Response(response) => response.into(),
                    PairingReply::Verified { response, cipher } => Reply {
                        response,
                        cipher: Some(cipher),
                    },
                }
            }
            Route::Pairings => {
                let session = self.sessions.borrow_mut().checkout(connection);
                let response = pairing::manage(&session, &request.body, self.store.as_ref()).await;
                self.sessions.borrow_mut().checkin(connection, session);
                self.refresh_paired().await;
                response.into()
            }
            Route::Identify => self.identify().await.into(),
            Route::Accessories => accessories::list(&self.bridge.borrow()).into(),
            Route::ReadCharacteristics => match ReadRequest::from_query(&request.query_params()) {
                Ok(read) => self
                    .characteristics
                    .borrow()
                    .read(&self.bridge.borrow(), &self.subscriber.borrow(), connection, &read)
                    .into(),
                Err(e) => {
                    warn!(error = %e, "Invalid characteristics query");
                    status_response(400, ServerStatus::InvalidValueInRequest).into()
                }
            },
            Route::WriteCharacteristics => self.write_characteristics(connection, &request.body).await.into(),
            Route::Prepare => match self.characteristics.borrow_mut().prepare(connection, &request.body) {
                Ok(response) => response.into(),
                Err(e) => {
                    warn!(error = %e, "Invalid prepare request");
                    status_response(400, ServerStatus::InvalidValueInRequest).into()
                }
            },
        }
    }

    async fn write_characteristics(&self, connection: u64, body: &[u8]) -> HttpResponse {
        let outcome = self.characteristics.borrow_mut().write(
            &mut self.bridge.borrow_mut(),
            &mut self.subscriber.borrow_mut(),
            connection,
            body,
        );

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Invalid characteristics write");
                return status_response(400, ServerStatus::InvalidValueInRequest);
            }
        };

        for write in outcome.device_writes {
            if let Err(e) = self.exchange.write_state(write.property, write.value).await {
                warn!(property = %write.property, error = %e, "Device write failed");
            }
        }

        outcome.response
    }

    /// Unpaired accessories identify themselves on request.
    async fn identify(&self) -> HttpResponse {
        match self.store.is_paired().await {
            Ok(false) => HttpResponse::no_content(),
            _ => status_response(400, ServerStatus::InsufficientPrivileges),
        }
    }

    async fn refresh_paired(&self) {
        match self.store.is_paired().await {
            Ok(paired) => {
                self.paired.send_if_modified(|current| {
                    let changed = *current != paired;
                    *current = paired;
                    changed
                });
            }
            Err(e) => warn!(error = %e, "Pairing state unavailable"),
        }
    }
}

fn status_response(status: u16, code: ServerStatus) -> HttpResponse {
    HttpResponse::json(status, &json!({ "status": code.code() }))
}
