//! # hap-discovery
//!
//! Multicast DNS advertisement of a HAP bridge.
//!
//! This crate provides:
//! - A DNS wire codec (header, resource records, messages)
//! - The record set advertised for `_hap._tcp`
//! - A UDP responder answering queries and announcing periodically
//!
//! ## Example
//!
//! ```ignore
//! use hap_discovery::{local_ipv4, HapZone, MulticastSocket, Responder};
//!
//! let address = local_ipv4()?;
//! let zone = HapZone::build(&config, address, false)?;
//! let responder = Responder::new(MulticastSocket::bind()?, zone, address);
//! responder.run(shutdown_rx).await?;
//! ```

pub mod decoder;
pub mod encoder;
mod header;
mod message;
mod record;
mod responder;
mod traits;
mod zone;

pub use decoder::{decode_domain_name, decode_message, Cursor};
pub use encoder::{encode_domain_name, encode_message};
pub use header::{Header, HEADER_LEN};
pub use message::Message;
pub use record::{RData, RecordType, ResourceRecord, Soa, Srv, CLASS_IN, CLASS_MASK};
pub use responder::{local_ipv4, MulticastSocket, Responder, BROADCAST_INTERVAL};
pub use traits::DatagramSocket;
pub use zone::{sanitize_name, setup_hash, HapZone};

use std::net::Ipv4Addr;

/// HAP service type advertised over DNS-SD.
pub const HAP_SERVICE_TYPE: &str = "_hap._tcp.local.";

/// mDNS IPv4 multicast group.
pub const MDNS_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);

pub const MDNS_PORT: u16 = 5353;
