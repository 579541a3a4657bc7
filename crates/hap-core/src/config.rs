//! Bridge configuration.
//!
//! Loaded once at startup from a JSON document. Every field has a default
//! so an empty object yields a usable, unpaired bridge with no accessories.

use crate::error::{Error, Result};
use crate::types::{
    AccessoryCategory, DeviceId, PropertyType, DEFAULT_BRIDGE_MODEL, DEFAULT_MANUFACTURER,
    DEFAULT_PORT,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Top level configuration of one bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub name: String,
    pub serial_number: String,
    pub firmware_revision: String,
    pub manufacturer: String,
    pub model: String,
    /// Accessory device id, "AA:BB:CC:DD:EE:FF".
    pub mac_address: String,
    /// Four character setup id used for the `sh` TXT hash.
    pub setup_id: String,
    /// Setup code in "XXX-XX-XXX" form.
    pub pin_code: String,
    pub port: u16,
    /// Configuration number advertised as `c#`.
    pub version: u32,
    /// File holding the hex encoded signing seed. A fresh identity is
    /// generated on every start when unset.
    pub identity_file: Option<PathBuf>,
    pub accessories: Vec<AccessoryConfig>,
}

/// One bridged accessory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessoryConfig {
    pub id: Option<Uuid>,
    pub name: String,
    pub aid: Option<u64>,
    pub category: AccessoryCategory,
    pub services: Vec<ServiceConfig>,
}

/// One service of an accessory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Catalog name of the service, e.g. "Lightbulb".
    #[serde(rename = "type")]
    pub service_type: String,
    pub primary: bool,
    pub hidden: bool,
    pub characteristics: Vec<CharacteristicConfig>,
}

/// A characteristic and the device property backing it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacteristicConfig {
    /// Catalog name of the characteristic, e.g. "Brightness".
    pub name: String,
    pub property: Option<PropertyConfig>,
    /// Initial value, used when no property is bound.
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyConfig {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: PropertyType,
    /// String enum items for enum/switch/button formatted properties.
    #[serde(default)]
    pub format: Option<Vec<String>>,
    /// Number range of the property, narrowing the characteristic limits.
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub step: Option<f64>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            name: "HomeKit Bridge".to_string(),
            serial_number: "0000001".to_string(),
            firmware_revision: env!("CARGO_PKG_VERSION").to_string(),
            manufacturer: DEFAULT_MANUFACTURER.to_string(),
            model: DEFAULT_BRIDGE_MODEL.to_string(),
            mac_address: "0E:9A:5F:21:33:7C".to_string(),
            setup_id: "HB01".to_string(),
            pin_code: "031-45-154".to_string(),
            port: DEFAULT_PORT,
            version: 1,
            identity_file: None,
            accessories: Vec::new(),
        }
    }
}

impl BridgeConfig {
    /// Read and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: BridgeConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        DeviceId::from_mac_string(&self.mac_address)?;

        if self.setup_id.len() != 4 || !self.setup_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::invalid_argument(format!(
                "Setup id must be 4 alphanumeric characters, got {:?}",
                self.setup_id
            )));
        }

        if !is_valid_pin(&self.pin_code) {
            return Err(Error::invalid_argument(format!(
                "PIN code must have XXX-XX-XXX format, got {:?}",
                self.pin_code
            )));
        }

        Ok(())
    }

    pub fn device_id(&self) -> Result<DeviceId> {
        DeviceId::from_mac_string(&self.mac_address)
    }
}

fn is_valid_pin(pin: &str) -> bool {
    let groups: Vec<&str> = pin.split('-').collect();
    groups.len() == 3
        && groups[0].len() == 3
        && groups[1].len() == 2
        && groups[2].len() == 3
        && groups
            .iter()
            .all(|g| g.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = BridgeConfig::from_json("{}").unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.manufacturer, DEFAULT_MANUFACTURER);
        assert!(config.accessories.is_empty());
    }

    #[test]
    fn accessories_are_parsed() {
        let raw = r#"{
            "name": "Living room",
            "accessories": [{
                "name": "Lamp",
                "aid": 4,
                "category": "light_bulb",
                "services": [{
                    "type": "Lightbulb",
                    "primary": true,
                    "characteristics": [
                        {"name": "On", "property": {"id": "7a0ad9a4-1c56-4f1f-9c63-96c8a0e6a1c3", "type": "dynamic"}},
                        {"name": "Brightness", "value": 50}
                    ]
                }]
            }]
        }"#;

        let config = BridgeConfig::from_json(raw).unwrap();
        let lamp = &config.accessories[0];
        assert_eq!(lamp.aid, Some(4));
        assert_eq!(lamp.category, AccessoryCategory::LightBulb);
        assert_eq!(lamp.services[0].service_type, "Lightbulb");
        let on = &lamp.services[0].characteristics[0];
        assert_eq!(on.property.as_ref().unwrap().kind, PropertyType::Dynamic);
    }

    #[test]
    fn invalid_pin_is_rejected() {
        let err = BridgeConfig::from_json(r#"{"pin_code": "12345678"}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn invalid_setup_id_is_rejected() {
        assert!(BridgeConfig::from_json(r#"{"setup_id": "TOO-LONG"}"#).is_err());
    }

    #[test]
    fn invalid_mac_is_rejected() {
        assert!(BridgeConfig::from_json(r#"{"mac_address": "not-a-mac"}"#).is_err());
    }

    #[test]
    fn malformed_json_surfaces_json_error() {
        let err = BridgeConfig::from_json("{").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }
}
