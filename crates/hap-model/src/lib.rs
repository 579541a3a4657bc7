//! # hap-model
//!
//! In-memory HAP accessory graph.
//!
//! This crate provides:
//! - Accessory, Bridge, Service and Characteristic with iid allocation
//! - JSON serialization for `/accessories` and `/characteristics`
//! - Value coercion between controllers and device properties
//! - RGB(W) and HSB reconciliation for light bulbs
//! - The bundled service/characteristic catalog and the config loader

pub mod accessory;
pub mod catalog;
pub mod characteristic;
pub mod color;
pub mod iid;
pub mod loader;
mod property;
pub mod service;
mod transformer;

pub use accessory::{Accessory, AccessoryInfo, Bridge, MAX_BRIDGED_AID};
pub use catalog::{Catalog, CharacteristicDefinition, ServiceDefinition};
pub use characteristic::{Characteristic, Constraints};
pub use color::{Hsb, Rgb};
pub use iid::{IidManager, ObjectId};
pub use loader::Loader;
pub use property::PropertyRef;
pub use service::Service;
pub use transformer::Transformer;
