//! # hap-core
//!
//! Core types, constants and error definitions shared across all HAP crates.
//!
//! This crate provides:
//! - The error taxonomy used by codecs, pairing and the object model
//! - HAP enumerations (categories, formats, permissions, status codes)
//! - UUID short-form helpers
//! - Bridge configuration

pub mod config;
pub mod error;
pub mod hap_type;
pub mod types;

pub use config::{AccessoryConfig, BridgeConfig, CharacteristicConfig, PropertyConfig, ServiceConfig};
pub use error::{CryptoError, DiscoveryError, Error, PairingError, Result};
pub use hap_type::{hap_type_to_uuid, uuid_to_hap_type};
pub use types::{
    AccessoryCategory, ClientPermission, DataType, DeviceId, Permission, PropertyType,
    ServerStatus, Unit,
};
