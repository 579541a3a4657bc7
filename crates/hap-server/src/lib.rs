//! # hap-server
//!
//! HTTP side of the accessory.
//!
//! This crate provides:
//! - HTTP/1.1 framing and `EVENT/1.0` notification frames
//! - Routing with pair-verify gating of protected resources
//! - `/accessories`, `/characteristics` and `/prepare` controllers
//! - Event fan-out to subscribed connections
//! - Writers folding device state back into the accessory graph
//! - The per-connection loop with the encrypted record layer

pub mod connection;
pub mod controllers;
pub mod exchange;
pub mod http;
pub mod router;
pub mod server;
pub mod subscriber;
pub mod traits;
pub mod writers;

#[cfg(test)]
mod test_support;

pub use exchange::MemoryExchange;
pub use http::{HttpRequest, HttpResponse, Method};
pub use router::{Reply, Router};
pub use server::Server;
pub use subscriber::Subscriber;
pub use traits::{DeviceExchange, PropertyEvent, PropertyState};
pub use writers::{EventWriter, PeriodicWriter, Writer};
