//! TCP accept loop.

use crate::connection;
use crate::router::Router;
use hap_core::error::Result;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// How often idle pairing sessions are swept.
pub const EVICTION_INTERVAL: Duration = Duration::from_secs(30);

pub struct Server {
    listener: TcpListener,
    router: Rc<Router>,
    next_connection: u64,
}

impl Server {
    pub async fn bind(addr: SocketAddr, router: Rc<Router>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "HAP server listening");

        Ok(Self {
            listener,
            router,
            next_connection: 1,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` turns true.
    ///
    /// Connections are served on the current `LocalSet`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut eviction = tokio::time::interval(EVICTION_INTERVAL);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!(error = %e, "Accept failed");
                            continue;
                        }
                    };
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(peer = %peer, error = %e, "Could not disable Nagle");
                    }

                    let id = self.next_connection;
                    self.next_connection += 1;
                    info!(connection = id, peer = %peer, "Controller connected");

                    let router = self.router.clone();
                    tokio::task::spawn_local(async move {
                        // Errors are logged by the connection itself.
                        let _ = connection::serve(stream, id, router).await;
                    });
                }
                _ = eviction.tick() => {
                    self.router.evict_expired_sessions();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("HAP server shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }
}
