//! # hap-crypto
//!
//! Cryptographic primitives and the binary codec behind HAP pairing.
//!
//! This crate provides:
//! - TLV8 encoding/decoding with fragmentation and record separators
//! - SRP-6a (3072-bit) server for pair-setup
//! - Curve25519 ECDH for pair-verify
//! - Ed25519 for long-term identity signatures
//! - ChaCha20-Poly1305 for pairing payloads and the session record layer
//! - HKDF-SHA512 for key derivation
//!
//! All secret material is zeroized on drop.

pub mod chacha;
pub mod curve25519;
pub mod ed25519;
pub mod hkdf;
pub mod keys;
pub mod srp;
pub mod tlv;

pub use chacha::SessionCipher;
pub use curve25519::EcdhKeyPair;
pub use ed25519::IdentityKeyPair;
pub use keys::{SessionKeys, SharedSecret};
pub use srp::SrpServer;
pub use tlv::{Tlv8, TlvError, TlvMethod, TlvState, TlvType, TlvValue};
