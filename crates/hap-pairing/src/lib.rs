//! # hap-pairing
//!
//! Accessory side of HomeKit pairing.
//!
//! This crate implements:
//! - Pair-setup (SRP-6a, M1-M6) storing the controller as admin
//! - Pair-verify (X25519 + Ed25519, M1-M4) yielding control channel keys
//! - `/pairings` list/add/remove for admin controllers
//! - Per-connection session state with idle expiry
//! - The accessory's long-term identity and the pairing store seam

mod identity;
mod pair_setup;
mod pair_verify;
pub mod pairings;
mod session;
mod store;
mod traits;

pub use identity::AccessoryIdentity;
pub use pair_setup::{error_response, PairSetup};
pub use pair_verify::{PairVerify, VerifyStep};
pub use session::{ConnectionSession, SessionRegistry, DEFAULT_SESSION_TIMEOUT};
pub use store::MemoryPairingStore;
pub use traits::{Pairing, PairingStore};
