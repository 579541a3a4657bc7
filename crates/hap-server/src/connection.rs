//! One controller connection.
//!
//! Requests are read, routed and answered strictly in order. Once
//! pair-verify succeeds every following byte in both directions is carried
//! in the encrypted record layer. Notifications queued by the subscriber are
//! interleaved between responses.

use crate::http::HttpRequest;
use crate::router::Router;
use hap_core::error::Result;
use hap_crypto::SessionCipher;
use std::rc::Rc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

const READ_CHUNK: usize = 4096;

/// Serve `stream` until the peer closes it or a framing error occurs.
///
/// The connection's subscriptions and pairing state are released on
/// return.
pub async fn serve<S>(stream: S, connection: u64, router: Rc<Router>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    router.subscriber().borrow_mut().register(connection, events_tx);

    let result = run(stream, connection, &router, events_rx).await;
    router.disconnect(connection);

    match &result {
        Ok(()) => info!(connection, "Connection closed"),
        Err(e) => warn!(connection, error = %e, "Connection closed with error"),
    }
    result
}

async fn run<S>(
    mut stream: S,
    connection: u64,
    router: &Router,
    mut events: mpsc::UnboundedReceiver<Vec<u8>>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut cipher: Option<SessionCipher> = None;
    // Ciphertext not yet forming a complete record.
    let mut sealed = Vec::new();
    // Plaintext not yet forming a complete request.
    let mut pending = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        tokio::select! {
            read = stream.read(&mut chunk) => {
                let n = read?;
                if n == 0 {
                    debug!(connection, "Peer closed the connection");
                    return Ok(());
                }
                trace!(connection, bytes = n, "Read");

                match cipher.as_mut() {
                    Some(cipher) => {
                        sealed.extend_from_slice(&chunk[..n]);
                        let (plain, used) = cipher.decrypt(&sealed)?;
                        sealed.drain(..used);
                        pending.extend_from_slice(&plain);
                    }
                    None => pending.extend_from_slice(&chunk[..n]),
                }

                while let Some((request, used)) = HttpRequest::parse(&pending)? {
                    pending.drain(..used);

                    let reply = router.handle(connection, request).await;
                    send(&mut stream, cipher.as_mut(), &reply.response.serialize()).await?;

                    if let Some(mut next) = reply.cipher {
                        debug!(connection, "Switching to encrypted session");
                        // Anything the controller sent after M3 is already sealed.
                        sealed.append(&mut pending);
                        let (plain, used) = next.decrypt(&sealed)?;
                        sealed.drain(..used);
                        pending.extend_from_slice(&plain);
                        cipher = Some(next);
                    }
                }
            }
            Some(frame) = events.recv() => {
                if cipher.is_none() {
                    trace!(connection, "Dropping event for unverified connection");
                    continue;
                }
                send(&mut stream, cipher.as_mut(), &frame).await?;
            }
        }
    }
}

async fn send<S>(stream: &mut S, cipher: Option<&mut SessionCipher>, data: &[u8]) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    match cipher {
        Some(cipher) => stream.write_all(&cipher.encrypt(data)?).await?,
        None => stream.write_all(data).await?,
    }
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpResponse, Method};
    use crate::test_support::{bridge, harness, iid, Controller};
    use hap_crypto::{SessionKeys, SharedSecret};
    use hap_pairing::PairingStore;
    use serde_json::json;
    use tokio::io::DuplexStream;
    use tokio::task::LocalSet;

    /// Length of the complete response at the front of `buf`, if any.
    fn complete(buf: &[u8]) -> Option<usize> {
        let head_end = buf.windows(4).position(|w| w == b"\r\n\r\n")? + 4;
        let head = std::str::from_utf8(&buf[..head_end]).ok()?;
        let length: usize = head
            .split("\r\n")
            .filter_map(|line| line.split_once(':'))
            .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.trim().parse().ok())
            .unwrap_or(0);
        (buf.len() >= head_end + length).then_some(head_end + length)
    }

    struct Client {
        stream: DuplexStream,
        cipher: Option<SessionCipher>,
        sealed: Vec<u8>,
        plain: Vec<u8>,
    }

    impl Client {
        fn new(stream: DuplexStream) -> Self {
            Self {
                stream,
                cipher: None,
                sealed: Vec::new(),
                plain: Vec::new(),
            }
        }

        async fn send(&mut self, request: HttpRequest) {
            let data = request.serialize();
            let data = match self.cipher.as_mut() {
                Some(cipher) => cipher.encrypt(&data).unwrap(),
                None => data,
            };
            self.stream.write_all(&data).await.unwrap();
        }

        /// Next response or event frame.
        async fn receive(&mut self) -> HttpResponse {
            let mut chunk = [0u8; 1024];
            loop {
                if let Some(len) = complete(&self.plain) {
                    let frame: Vec<u8> = self.plain.drain(..len).collect();
                    return HttpResponse::parse(&frame).unwrap();
                }

                let n = self.stream.read(&mut chunk).await.unwrap();
                assert!(n > 0, "server closed the connection");
                match self.cipher.as_mut() {
                    Some(cipher) => {
                        self.sealed.extend_from_slice(&chunk[..n]);
                        let (plain, used) = cipher.decrypt(&self.sealed).unwrap();
                        self.sealed.drain(..used);
                        self.plain.extend_from_slice(&plain);
                    }
                    None => self.plain.extend_from_slice(&chunk[..n]),
                }
            }
        }

        async fn request(&mut self, request: HttpRequest) -> HttpResponse {
            self.send(request).await;
            self.receive().await
        }

        async fn pair_verify(&mut self, controller: &Controller) {
            let m2 = self
                .request(HttpRequest::new(Method::Post, "/pair-verify").with_body(controller.m1()))
                .await;
            let (m3, shared) = controller.m3_with_secret(&m2.body);
            let m4 = self
                .request(HttpRequest::new(Method::Post, "/pair-verify").with_body(m3))
                .await;
            assert_eq!(m4.status, 200);

            let keys = SessionKeys::derive_control_keys(&SharedSecret::new(shared.to_vec())).unwrap();
            self.cipher = Some(keys.controller_cipher());
        }
    }

    #[tokio::test]
    async fn plaintext_request_before_verification() {
        let harness = harness();
        let local = LocalSet::new();
        local
            .run_until(async {
                let (client, server) = tokio::io::duplex(8192);
                let task = tokio::task::spawn_local(serve(server, 1, harness.router.clone()));
                let mut client = Client::new(client);

                let response = client
                    .request(HttpRequest::new(Method::Get, "/accessories"))
                    .await;
                assert_eq!(response.status, 470);

                drop(client);
                assert!(task.await.unwrap().is_ok());
            })
            .await;
    }

    #[tokio::test]
    async fn encrypted_session_after_verification() {
        let harness = harness();
        let controller = Controller::new("iPhone");
        harness.store.add(controller.pairing()).await.unwrap();
        harness.store.set_paired(true).await.unwrap();

        let local = LocalSet::new();
        local
            .run_until(async {
                let (client, server) = tokio::io::duplex(8192);
                tokio::task::spawn_local(serve(server, 7, harness.router.clone()));
                let mut client = Client::new(client);

                client.pair_verify(&controller).await;
                assert!(harness.router.is_verified(7));

                let response = client
                    .request(HttpRequest::new(Method::Get, "/accessories"))
                    .await;
                assert_eq!(response.status, 200);
                let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
                assert_eq!(body["accessories"][1]["aid"], json!(2));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn events_reach_subscribed_connection() {
        let harness = harness();
        let first = Controller::new("iPhone");
        let second = Controller::new("iPad");
        harness.store.add(first.pairing()).await.unwrap();
        harness.store.add(second.pairing()).await.unwrap();
        harness.store.set_paired(true).await.unwrap();

        let local = LocalSet::new();
        local
            .run_until(async {
                let (watcher, server) = tokio::io::duplex(8192);
                tokio::task::spawn_local(serve(server, 1, harness.router.clone()));
                let mut watcher = Client::new(watcher);
                watcher.pair_verify(&first).await;

                let (writer, server) = tokio::io::duplex(8192);
                tokio::task::spawn_local(serve(server, 2, harness.router.clone()));
                let mut writer = Client::new(writer);
                writer.pair_verify(&second).await;

                let on = iid(&bridge(), 2, "Lightbulb", "On");

                let subscribe = json!({"characteristics": [{"aid": 2, "iid": on, "ev": true}]});
                let response = watcher
                    .request(HttpRequest::new(Method::Put, "/characteristics").with_body(subscribe.to_string()))
                    .await;
                assert_eq!(response.status, 204);

                let write = json!({"characteristics": [{"aid": 2, "iid": on, "value": true}]});
                let response = writer
                    .request(HttpRequest::new(Method::Put, "/characteristics").with_body(write.to_string()))
                    .await;
                assert_eq!(response.status, 204);

                let event = watcher.receive().await;
                assert_eq!(event.status, 200);
                let body: serde_json::Value = serde_json::from_slice(&event.body).unwrap();
                assert_eq!(
                    body,
                    json!({"characteristics": [{"aid": 2, "iid": on, "value": true}]})
                );
            })
            .await;
    }

    #[tokio::test]
    async fn disconnect_releases_subscriptions() {
        let harness = harness();
        let controller = Controller::new("iPhone");
        harness.store.add(controller.pairing()).await.unwrap();
        harness.store.set_paired(true).await.unwrap();

        let local = LocalSet::new();
        local
            .run_until(async {
                let (client, server) = tokio::io::duplex(8192);
                let task = tokio::task::spawn_local(serve(server, 3, harness.router.clone()));
                let mut client = Client::new(client);
                client.pair_verify(&controller).await;

                let on = iid(&bridge(), 2, "Lightbulb", "On");
                let subscribe = json!({"characteristics": [{"aid": 2, "iid": on, "ev": true}]});
                client
                    .request(HttpRequest::new(Method::Put, "/characteristics").with_body(subscribe.to_string()))
                    .await;
                assert!(harness.router.subscriber().borrow().is_subscribed(3, 2, on));

                drop(client);
                task.await.unwrap().unwrap();
                assert!(!harness.router.is_verified(3));
                assert!(!harness.router.subscriber().borrow().is_subscribed(3, 2, on));
            })
            .await;
    }
}
