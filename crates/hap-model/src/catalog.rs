//! Read-only catalog of service and characteristic definitions.
//!
//! Definitions are bundled with the crate as JSON and parsed once at start
//! up. The catalog is never mutated afterwards and is shared through an
//! `Arc` by the loader and anything else that builds services.

use crate::characteristic::{Characteristic, Constraints};
use crate::service::Service;
use hap_core::error::{Error, Result};
use hap_core::{hap_type_to_uuid, DataType, Permission, Unit};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

const BUNDLED_SERVICES: &str = include_str!("../resources/services.json");
const BUNDLED_CHARACTERISTICS: &str = include_str!("../resources/characteristics.json");

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceDefinition {
    #[serde(rename = "UUID")]
    pub uuid: Option<String>,
    pub required_characteristics: Option<Vec<String>>,
    #[serde(default)]
    pub optional_characteristics: Vec<String>,
    #[serde(default)]
    pub virtual_characteristics: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CharacteristicDefinition {
    #[serde(rename = "UUID")]
    pub uuid: Option<String>,
    pub format: Option<DataType>,
    pub permissions: Option<Vec<Permission>>,
    pub unit: Option<Unit>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub min_step: Option<f64>,
    pub maximum_length: Option<usize>,
    pub valid_values: Option<Vec<i64>>,
    pub default: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    services: HashMap<String, ServiceDefinition>,
    characteristics: HashMap<String, CharacteristicDefinition>,
}

impl Catalog {
    /// Definitions shipped with the crate.
    pub fn bundled() -> Result<Self> {
        Self::from_json(BUNDLED_SERVICES, BUNDLED_CHARACTERISTICS)
    }

    pub fn from_json(services: &str, characteristics: &str) -> Result<Self> {
        let services: HashMap<String, ServiceDefinition> = serde_json::from_str(services)?;
        let characteristics: HashMap<String, CharacteristicDefinition> =
            serde_json::from_str(characteristics)?;

        debug!(
            services = services.len(),
            characteristics = characteristics.len(),
            "Loaded catalog"
        );

        Ok(Self {
            services,
            characteristics,
        })
    }

    pub fn service_definition(&self, name: &str) -> Option<&ServiceDefinition> {
        self.services.get(name)
    }

    pub fn characteristic_definition(&self, name: &str) -> Option<&CharacteristicDefinition> {
        self.characteristics.get(name)
    }

    /// Empty service of the named type.
    pub fn build_service(&self, name: &str) -> Result<Service> {
        let definition = self.services.get(name).ok_or_else(|| {
            Error::invalid_argument(format!("Definition for service: {} was not found", name))
        })?;

        let (Some(uuid), Some(required)) = (
            definition.uuid.as_deref(),
            definition.required_characteristics.as_ref(),
        ) else {
            return Err(Error::invalid_state(
                "Service definition is missing required attributes",
            ));
        };

        Ok(Service::new(
            hap_type_to_uuid(uuid)?,
            name,
            required.clone(),
            definition.optional_characteristics.clone(),
            definition.virtual_characteristics.clone(),
        ))
    }

    /// Characteristic of the named type holding its default value.
    pub fn build_characteristic(&self, name: &str) -> Result<Characteristic> {
        let definition = self.characteristics.get(name).ok_or_else(|| {
            Error::invalid_argument(format!(
                "Definition for characteristic: {} was not found",
                name
            ))
        })?;

        let (Some(uuid), Some(format), Some(permissions)) = (
            definition.uuid.as_deref(),
            definition.format,
            definition.permissions.as_ref(),
        ) else {
            return Err(Error::invalid_state(
                "Characteristic definition is missing required attributes",
            ));
        };

        let constraints = Constraints {
            valid_values: definition.valid_values.clone(),
            max_length: definition.maximum_length,
            min_value: definition.min_value,
            max_value: definition.max_value,
            min_step: definition.min_step,
            unit: definition.unit,
        };

        let characteristic = Characteristic::new(
            hap_type_to_uuid(uuid)?,
            name,
            format,
            permissions.clone(),
            constraints,
        )?;

        Ok(match &definition.default {
            Some(value) => characteristic.with_value(value.clone()),
            None => characteristic,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    mod bundled {
        use super::*;

        #[test]
        fn lightbulb_definition() {
            let catalog = Catalog::bundled().unwrap();
            let service = catalog.build_service("Lightbulb").unwrap();

            assert_eq!(service.type_id(), hap_type_to_uuid("43").unwrap());
            assert_eq!(service.required_characteristics(), ["On".to_string()]);
            assert!(service.allowed_characteristics().any(|n| n == "ColorWhite"));
        }

        #[test]
        fn color_channels_are_virtual() {
            let catalog = Catalog::bundled().unwrap();
            let red = catalog.build_characteristic("ColorRed").unwrap();
            assert!(red.is_virtual());
            assert_eq!(red.value(), &json!(0));
        }

        #[test]
        fn brightness_constraints() {
            let catalog = Catalog::bundled().unwrap();
            let brightness = catalog.build_characteristic("Brightness").unwrap();

            assert_eq!(brightness.data_type(), DataType::Int);
            assert_eq!(brightness.constraints().max_value, Some(100.0));
            assert_eq!(brightness.constraints().unit, Some(Unit::Percentage));
            assert!(brightness.has_permission(Permission::Notify));
        }

        #[test]
        fn every_service_member_is_defined() {
            let catalog = Catalog::bundled().unwrap();
            for name in catalog.services.keys() {
                let service = catalog.build_service(name).unwrap();
                for member in service.allowed_characteristics() {
                    assert!(
                        catalog.build_characteristic(member).is_ok(),
                        "{} of {} is not buildable",
                        member,
                        name
                    );
                }
            }
        }
    }

    mod errors {
        use super::*;

        #[test]
        fn unknown_definitions() {
            let catalog = Catalog::bundled().unwrap();
            assert!(matches!(
                catalog.build_service("Teleporter"),
                Err(Error::InvalidArgument(_))
            ));
            assert!(matches!(
                catalog.build_characteristic("WarpFactor"),
                Err(Error::InvalidArgument(_))
            ));
        }

        #[test]
        fn incomplete_definitions() {
            let catalog = Catalog::from_json(
                r#"{"Fan": {"UUID": "40"}}"#,
                r#"{"Speed": {"UUID": "29", "Format": "float"}}"#,
            )
            .unwrap();

            assert!(matches!(
                catalog.build_service("Fan"),
                Err(Error::InvalidState(_))
            ));
            assert!(matches!(
                catalog.build_characteristic("Speed"),
                Err(Error::InvalidState(_))
            ));
        }
    }
}
