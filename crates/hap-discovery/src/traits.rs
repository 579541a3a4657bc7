//! Trait definitions for the responder transport (enables mocking in tests).

use hap_core::Result;
use async_trait::async_trait;
use std::net::SocketAddr;

/// A datagram transport the responder reads queries from and writes
/// responses to.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait DatagramSocket: Send + Sync {
    /// Send one datagram.
    async fn send_to(&self, data: Vec<u8>, target: SocketAddr) -> Result<()>;

    /// Wait for the next datagram and its sender.
    async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr)>;
}
