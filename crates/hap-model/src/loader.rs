//! Builds the accessory graph from the bridge configuration.

use crate::accessory::{Accessory, AccessoryInfo, Bridge};
use crate::catalog::Catalog;
use crate::characteristic::Characteristic;
use crate::property::PropertyRef;
use crate::service::Service;
use hap_core::config::{AccessoryConfig, BridgeConfig, CharacteristicConfig, ServiceConfig};
use hap_core::error::Result;
use hap_core::types::DEFAULT_DEVICE_MODEL;
use std::sync::Arc;
use tracing::{debug, info};

pub struct Loader {
    catalog: Arc<Catalog>,
}

impl Loader {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Build the bridge and every configured accessory.
    ///
    /// Accessories with a configured aid are added first in ascending aid
    /// order so automatic allocation never takes an aid that is claimed
    /// later in the list.
    pub fn load(&self, config: &BridgeConfig) -> Result<Bridge> {
        let mut bridge = Bridge::new(
            &self.catalog,
            AccessoryInfo {
                name: config.name.clone(),
                manufacturer: config.manufacturer.clone(),
                model: config.model.clone(),
                serial_number: config.serial_number.clone(),
                firmware_revision: config.firmware_revision.clone(),
            },
        )?;

        let mut accessories: Vec<&AccessoryConfig> = config.accessories.iter().collect();
        accessories.sort_by_key(|a| (a.aid.is_none(), a.aid));

        for accessory_config in accessories {
            let accessory = self.build_accessory(config, accessory_config)?;
            let aid = bridge.add_accessory(accessory)?;
            debug!(aid, name = %accessory_config.name, "Loaded accessory");
        }

        info!(
            accessories = bridge.accessories().len(),
            "Accessory graph loaded"
        );

        Ok(bridge)
    }

    fn build_accessory(&self, bridge: &BridgeConfig, config: &AccessoryConfig) -> Result<Accessory> {
        let info = AccessoryInfo {
            name: config.name.clone(),
            manufacturer: bridge.manufacturer.clone(),
            model: DEFAULT_DEVICE_MODEL.to_string(),
            serial_number: config
                .id
                .map(|id| id.simple().to_string())
                .unwrap_or_else(|| bridge.serial_number.clone()),
            firmware_revision: bridge.firmware_revision.clone(),
        };

        let mut accessory = Accessory::new(&self.catalog, info, config.aid, config.category)?;
        if let Some(id) = config.id {
            accessory = accessory.with_id(id);
        }

        for service_config in &config.services {
            let service = self.build_service(service_config)?;
            accessory.add_service(service)?;
        }

        Ok(accessory)
    }

    fn build_service(&self, config: &ServiceConfig) -> Result<Service> {
        let mut service = self.catalog.build_service(&config.service_type)?;
        service.set_primary(config.primary);
        service.set_hidden(config.hidden);

        for characteristic_config in &config.characteristics {
            let characteristic = self.build_characteristic(characteristic_config)?;
            service.add_characteristic(characteristic)?;
        }

        Ok(service)
    }

    /// Catalog characteristic narrowed by its bound property.
    ///
    /// Numeric enum items of the property restrict the valid values and a
    /// property number range replaces the catalog limits.
    fn build_characteristic(&self, config: &CharacteristicConfig) -> Result<Characteristic> {
        let mut characteristic = self.catalog.build_characteristic(&config.name)?;

        if let Some(property) = &config.property {
            let mut constraints = characteristic.constraints().clone();

            if let Some(items) = &property.format {
                let numeric: Option<Vec<i64>> =
                    items.iter().map(|item| item.trim().parse().ok()).collect();
                if let Some(numeric) = numeric {
                    constraints.valid_values = Some(match constraints.valid_values.take() {
                        Some(defaults) => defaults
                            .into_iter()
                            .filter(|value| numeric.contains(value))
                            .collect(),
                        None => numeric,
                    });
                }
            }

            constraints.min_value = property.min.or(constraints.min_value);
            constraints.max_value = property.max.or(constraints.max_value);
            constraints.min_step = property.step.or(constraints.min_step);

            characteristic = characteristic
                .with_constraints(constraints)?
                .with_property(PropertyRef::from(property));
        }

        if let Some(value) = &config.value {
            characteristic.set_value(value.clone());
        }

        Ok(characteristic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{ACCESSORY_INFORMATION, PROTOCOL_INFORMATION};
    use hap_core::config::PropertyConfig;
    use hap_core::{AccessoryCategory, Error, PropertyType};
    use serde_json::json;
    use uuid::Uuid;

    fn loader() -> Loader {
        Loader::new(Arc::new(Catalog::bundled().unwrap()))
    }

    fn accessory(name: &str, aid: Option<u64>, services: Vec<ServiceConfig>) -> AccessoryConfig {
        AccessoryConfig {
            id: None,
            name: name.to_string(),
            aid,
            category: AccessoryCategory::LightBulb,
            services,
        }
    }

    fn lightbulb() -> ServiceConfig {
        ServiceConfig {
            service_type: "Lightbulb".to_string(),
            primary: true,
            hidden: false,
            characteristics: vec![
                CharacteristicConfig {
                    name: "On".to_string(),
                    property: Some(PropertyConfig {
                        id: Uuid::new_v4(),
                        kind: PropertyType::Dynamic,
                        format: None,
                        min: None,
                        max: None,
                        step: None,
                    }),
                    value: Some(json!(true)),
                },
                CharacteristicConfig {
                    name: "Brightness".to_string(),
                    property: None,
                    value: Some(json!(40)),
                },
            ],
        }
    }

    mod bridge {
        use super::*;

        #[test]
        fn empty_config_builds_bare_bridge() {
            let bridge = loader().load(&BridgeConfig::default()).unwrap();
            let root = bridge.accessory();

            assert!(bridge.accessories().is_empty());
            assert_eq!(root.find_services(ACCESSORY_INFORMATION).count(), 1);
            assert_eq!(root.find_services(PROTOCOL_INFORMATION).count(), 1);
            let information = root.find_services(ACCESSORY_INFORMATION).next().unwrap();
            assert_eq!(
                information.find_characteristic("Name").unwrap().value(),
                &json!("HomeKit Bridge")
            );
        }

        #[test]
        fn explicit_aids_are_placed_first() {
            let config = BridgeConfig {
                accessories: vec![
                    accessory("Auto", None, vec![]),
                    accessory("Three", Some(3), vec![]),
                    accessory("Two", Some(2), vec![]),
                ],
                ..Default::default()
            };

            let bridge = loader().load(&config).unwrap();
            let names: Vec<(u64, &str)> = bridge
                .accessories()
                .iter()
                .map(|a| (a.aid().unwrap(), a.name()))
                .collect();

            assert_eq!(names, vec![(2, "Two"), (3, "Three"), (4, "Auto")]);
        }

        #[test]
        fn duplicate_configured_aids_fail() {
            let config = BridgeConfig {
                accessories: vec![accessory("A", Some(2), vec![]), accessory("B", Some(2), vec![])],
                ..Default::default()
            };

            assert!(matches!(loader().load(&config), Err(Error::InvalidArgument(_))));
        }
    }

    mod services {
        use super::*;

        #[test]
        fn configured_values_and_flags() {
            let config = BridgeConfig {
                accessories: vec![accessory("Lamp", None, vec![lightbulb()])],
                ..Default::default()
            };

            let bridge = loader().load(&config).unwrap();
            let lamp = bridge.find_accessory(2).unwrap();
            let bulb = lamp.find_services("Lightbulb").next().unwrap();

            assert!(bulb.is_primary());
            assert_eq!(bulb.find_characteristic("On").unwrap().value(), &json!(true));
            assert_eq!(bulb.find_characteristic("Brightness").unwrap().value(), &json!(40));
            assert!(bulb.find_characteristic("On").unwrap().property().is_some());
        }

        #[test]
        fn unknown_service_fails() {
            let mut service = lightbulb();
            service.service_type = "Teleporter".to_string();
            let config = BridgeConfig {
                accessories: vec![accessory("Lamp", None, vec![service])],
                ..Default::default()
            };

            assert!(matches!(loader().load(&config), Err(Error::InvalidArgument(_))));
        }

        #[test]
        fn property_narrows_constraints() {
            let service = ServiceConfig {
                service_type: "StatelessProgrammableSwitch".to_string(),
                primary: false,
                hidden: false,
                characteristics: vec![CharacteristicConfig {
                    name: "ProgrammableSwitchEvent".to_string(),
                    property: Some(PropertyConfig {
                        id: Uuid::new_v4(),
                        kind: PropertyType::Dynamic,
                        format: Some(vec!["0".into(), "2".into(), "9".into()]),
                        min: None,
                        max: Some(1.0),
                        step: None,
                    }),
                    value: None,
                }],
            };
            let config = BridgeConfig {
                accessories: vec![accessory("Button", None, vec![service])],
                ..Default::default()
            };

            let bridge = loader().load(&config).unwrap();
            let button = bridge.find_accessory(2).unwrap();
            let event = button
                .find_services("StatelessProgrammableSwitch")
                .next()
                .unwrap()
                .find_characteristic("ProgrammableSwitchEvent")
                .unwrap();

            assert_eq!(event.constraints().valid_values, Some(vec![0, 2]));
            assert_eq!(event.constraints().max_value, Some(1.0));
        }
    }
}
