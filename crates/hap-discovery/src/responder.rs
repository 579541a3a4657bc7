//! Multicast DNS responder advertising the bridge.

use crate::decoder::decode_message;
use crate::encoder::encode_message;
use crate::header::Header;
use crate::message::Message;
use crate::traits::DatagramSocket;
use crate::zone::HapZone;
use crate::{MDNS_GROUP, MDNS_PORT};
use async_trait::async_trait;
use hap_core::error::DiscoveryError;
use hap_core::Result;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, trace, warn};

/// Unsolicited announcement period.
pub const BROADCAST_INTERVAL: Duration = Duration::from_secs(60);

const MAX_PACKET_LEN: usize = 9000;

/// UDP socket bound to the mDNS port and joined to the multicast group.
pub struct MulticastSocket {
    socket: UdpSocket,
}

impl MulticastSocket {
    pub fn bind() -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| DiscoveryError::Socket(format!("Failed to create socket: {}", e)))?;
        socket.set_reuse_address(true)?;

        let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, MDNS_PORT));
        socket
            .bind(&bind_addr.into())
            .map_err(|e| DiscoveryError::Socket(format!("Failed to bind {}: {}", bind_addr, e)))?;

        socket
            .join_multicast_v4(&MDNS_GROUP, &Ipv4Addr::UNSPECIFIED)
            .map_err(|e| DiscoveryError::Socket(format!("Failed to join {}: {}", MDNS_GROUP, e)))?;
        socket.set_multicast_loop_v4(true)?;
        socket.set_multicast_ttl_v4(255)?;
        socket.set_nonblocking(true)?;

        let socket = UdpSocket::from_std(socket.into())?;
        debug!("mDNS socket bound to {}", bind_addr);

        Ok(Self { socket })
    }
}

#[async_trait]
impl DatagramSocket for MulticastSocket {
    async fn send_to(&self, data: Vec<u8>, target: SocketAddr) -> Result<()> {
        self.socket.send_to(&data, target).await?;
        Ok(())
    }

    async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr)> {
        let mut buf = vec![0u8; MAX_PACKET_LEN];
        let (len, from) = self.socket.recv_from(&mut buf).await?;
        buf.truncate(len);
        Ok((buf, from))
    }
}

/// First non-loopback IPv4 address of this host.
pub fn local_ipv4() -> Result<Ipv4Addr> {
    match local_ip_address::local_ip() {
        Ok(IpAddr::V4(addr)) => Ok(addr),
        Ok(IpAddr::V6(addr)) => Err(DiscoveryError::Socket(format!(
            "Local address {} is not IPv4",
            addr
        ))
        .into()),
        Err(e) => Err(DiscoveryError::Socket(format!("No local address: {}", e)).into()),
    }
}

/// Answers queries for the bridge's records and announces them periodically.
pub struct Responder<S: DatagramSocket = MulticastSocket> {
    socket: S,
    zone: RwLock<HapZone>,
    local_address: Ipv4Addr,
}

impl<S: DatagramSocket> Responder<S> {
    pub fn new(socket: S, zone: HapZone, local_address: Ipv4Addr) -> Self {
        Self {
            socket,
            zone: RwLock::new(zone),
            local_address,
        }
    }

    fn group() -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(MDNS_GROUP, MDNS_PORT))
    }

    /// Serve until `shutdown` flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(instance = %self.zone.read().await.instance(), "mDNS responder started");

        let mut ticker = tokio::time::interval(BROADCAST_INTERVAL);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.announce().await {
                        warn!("Failed to announce mDNS records: {}", e);
                    }
                }
                received = self.socket.recv_from() => match received {
                    Ok((data, from)) => {
                        if let Err(e) = self.handle_packet(&data, from).await {
                            warn!(peer = %from, "Failed to answer mDNS query: {}", e);
                        }
                    }
                    Err(e) => warn!("mDNS receive failed: {}", e),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("mDNS responder stopped");
        Ok(())
    }

    /// Multicast every record of the zone.
    pub async fn announce(&self) -> Result<()> {
        let records = self.zone.read().await.records().to_vec();
        let message = Message::new(response_header(0), vec![], records, vec![], vec![])
            .map_err(|e| DiscoveryError::Encode(e.to_string()))?;
        let data = encode_message(&message)
            .map_err(|e| DiscoveryError::Encode(e.to_string()))?;

        trace!(len = data.len(), "Announcing mDNS records");
        self.socket.send_to(data, Self::group()).await
    }

    /// Update the paired flag and re-announce when it changed.
    pub async fn set_paired(&self, paired: bool) -> Result<()> {
        let changed = self.zone.write().await.set_paired(paired);
        if changed {
            debug!(paired, "Refreshing mDNS records");
            self.announce().await?;
        }
        Ok(())
    }

    /// Answer one received datagram. Our own and undecodable packets are
    /// dropped.
    pub async fn handle_packet(&self, data: &[u8], from: SocketAddr) -> Result<()> {
        if from.ip() == IpAddr::V4(self.local_address) {
            return Ok(());
        }

        let query = match decode_message(data) {
            Ok(message) => message,
            Err(e) => {
                debug!(peer = %from, "Ignoring undecodable mDNS packet: {}", e);
                return Ok(());
            }
        };

        let Some(response) = self.respond(&query).await else {
            return Ok(());
        };

        let data = encode_message(&response)
            .map_err(|e| DiscoveryError::Encode(e.to_string()))?;
        trace!(peer = %from, answers = response.answers().len(), "Sending mDNS response");
        self.socket.send_to(data, Self::group()).await
    }

    /// Build the response to a query, or None when nothing matches.
    pub async fn respond(&self, query: &Message) -> Option<Message> {
        if !query.is_query() || query.questions().is_empty() {
            return None;
        }

        let zone = self.zone.read().await;
        let answers = zone.answers(query.questions());
        if answers.is_empty() {
            return None;
        }
        let additionals = zone.additionals(&answers);

        match Message::new(
            response_header(query.header().id),
            vec![],
            answers,
            vec![],
            additionals,
        ) {
            Ok(response) => Some(response),
            Err(e) => {
                warn!("Dropping mDNS response: {}", e);
                None
            }
        }
    }
}

fn response_header(id: u16) -> Header {
    Header {
        id,
        response: true,
        authoritative: true,
        recursion_available: false,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{RData, RecordType, ResourceRecord, CLASS_IN};
    use crate::traits::MockDatagramSocket;
    use hap_core::BridgeConfig;

    const LOCAL: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 20);

    fn zone() -> HapZone {
        HapZone::build(&BridgeConfig::default(), LOCAL, false).unwrap()
    }

    fn peer() -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 99), 5353))
    }

    fn query(name: &str, rtype: RecordType) -> Vec<u8> {
        let message = Message::new(
            Header {
                id: 0x42,
                ..Default::default()
            },
            vec![ResourceRecord::question(name, rtype, CLASS_IN)],
            vec![],
            vec![],
            vec![],
        )
        .unwrap();
        encode_message(&message).unwrap()
    }

    mod answering {
        use super::*;

        #[tokio::test]
        async fn ptr_query_is_answered_on_group() {
            let mut mock = MockDatagramSocket::new();
            mock.expect_send_to().times(1).returning(|data, target| {
                let response = decode_message(&data).unwrap();
                assert_eq!(target, SocketAddr::V4(SocketAddrV4::new(MDNS_GROUP, MDNS_PORT)));
                assert!(response.header().response);
                assert!(response.header().authoritative);
                assert_eq!(response.header().id, 0x42);
                assert_eq!(response.answers().len(), 1);
                assert_eq!(response.additionals().len(), 3);
                Box::pin(async { Ok(()) })
            });

            let responder = Responder::new(mock, zone(), LOCAL);
            responder
                .handle_packet(&query("_hap._tcp.local", RecordType::Ptr), peer())
                .await
                .unwrap();
        }

        #[tokio::test]
        async fn unmatched_query_sends_nothing() {
            let mut mock = MockDatagramSocket::new();
            mock.expect_send_to().times(0);

            let responder = Responder::new(mock, zone(), LOCAL);
            responder
                .handle_packet(&query("_ipp._tcp.local", RecordType::Ptr), peer())
                .await
                .unwrap();
        }

        #[tokio::test]
        async fn own_packets_are_ignored() {
            let mut mock = MockDatagramSocket::new();
            mock.expect_send_to().times(0);

            let responder = Responder::new(mock, zone(), LOCAL);
            let own = SocketAddr::V4(SocketAddrV4::new(LOCAL, 5353));
            responder
                .handle_packet(&query("_hap._tcp.local", RecordType::Ptr), own)
                .await
                .unwrap();
        }

        #[tokio::test]
        async fn garbage_is_ignored() {
            let mut mock = MockDatagramSocket::new();
            mock.expect_send_to().times(0);

            let responder = Responder::new(mock, zone(), LOCAL);
            responder.handle_packet(&[0x01, 0x02], peer()).await.unwrap();
        }

        #[tokio::test]
        async fn responses_are_not_answered() {
            let responder = Responder::new(MockDatagramSocket::new(), zone(), LOCAL);
            let response = Message::new(
                response_header(1),
                vec![ResourceRecord::question("_hap._tcp.local", RecordType::Ptr, CLASS_IN)],
                vec![],
                vec![],
                vec![],
            )
            .unwrap();
            assert!(responder.respond(&response).await.is_none());
        }
    }

    mod announcing {
        use super::*;

        #[tokio::test]
        async fn announce_sends_whole_zone() {
            let mut mock = MockDatagramSocket::new();
            mock.expect_send_to().times(1).returning(|data, _| {
                let message = decode_message(&data).unwrap();
                assert_eq!(message.answers().len(), 4);
                Box::pin(async { Ok(()) })
            });

            let responder = Responder::new(mock, zone(), LOCAL);
            responder.announce().await.unwrap();
        }

        #[tokio::test]
        async fn set_paired_announces_only_on_change() {
            let mut mock = MockDatagramSocket::new();
            mock.expect_send_to().times(1).returning(|data, _| {
                let message = decode_message(&data).unwrap();
                let txt = message
                    .answers()
                    .iter()
                    .find_map(|r| match &r.rdata {
                        Some(RData::Txt(txt)) => Some(txt.clone()),
                        _ => None,
                    })
                    .unwrap();
                assert!(txt.contains(&"sf=0".to_string()));
                Box::pin(async { Ok(()) })
            });

            let responder = Responder::new(mock, zone(), LOCAL);
            responder.set_paired(true).await.unwrap();
            responder.set_paired(true).await.unwrap();
        }
    }
}
