//! HAP characteristic, the smallest unit of accessory state.

use crate::property::PropertyRef;
use crate::transformer::Transformer;
use hap_core::error::{Error, Result};
use hap_core::{uuid_to_hap_type, DataType, Permission, Unit};
use serde_json::{json, Map, Value};
use uuid::{uuid, Uuid};

/// Length assumed by controllers when `maxLen` is absent.
pub const DEFAULT_MAX_LENGTH: usize = 64;

pub const ABSOLUTE_MAX_LENGTH: usize = 256;

/// Type id of characteristics that exist only inside the bridge.
pub const VIRTUAL_TYPE_ID: Uuid = Uuid::nil();

const PROGRAMMABLE_SWITCH_EVENT: Uuid = uuid!("00000073-0000-1000-8000-0026BB765291");
const BUTTON_EVENT: Uuid = uuid!("00000126-0000-1000-8000-0026BB765291");

/// Types whose reads always return null; the value is only delivered as an event.
const ALWAYS_NULL: [Uuid; 1] = [PROGRAMMABLE_SWITCH_EVENT];

/// Types whose changes are pushed without event coalescing.
const IMMEDIATE_NOTIFY: [Uuid; 2] = [BUTTON_EVENT, PROGRAMMABLE_SWITCH_EVENT];

/// Numeric and length constraints of a characteristic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraints {
    pub valid_values: Option<Vec<i64>>,
    pub max_length: Option<usize>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub min_step: Option<f64>,
    pub unit: Option<Unit>,
}

#[derive(Debug, Clone)]
pub struct Characteristic {
    type_id: Uuid,
    name: String,
    data_type: DataType,
    permissions: Vec<Permission>,
    property: Option<PropertyRef>,
    constraints: Constraints,
    value: Value,
    expected_value: Option<Value>,
    valid: bool,
}

impl Characteristic {
    pub fn new(
        type_id: Uuid,
        name: impl Into<String>,
        data_type: DataType,
        permissions: Vec<Permission>,
        constraints: Constraints,
    ) -> Result<Self> {
        let name = name.into();

        check_max_length(&name, &constraints)?;

        Ok(Self {
            type_id,
            name,
            data_type,
            permissions,
            property: None,
            constraints,
            value: Value::Null,
            expected_value: None,
            valid: true,
        })
    }

    pub fn with_property(mut self, property: PropertyRef) -> Self {
        self.property = Some(property);
        self
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = value;
        self
    }

    /// Replace the constraints, e.g. with limits narrowed by a device property.
    pub fn with_constraints(mut self, constraints: Constraints) -> Result<Self> {
        check_max_length(&self.name, &constraints)?;
        self.constraints = constraints;
        Ok(self)
    }

    pub fn type_id(&self) -> Uuid {
        self.type_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    pub fn property(&self) -> Option<&PropertyRef> {
        self.property.as_ref()
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    /// Current (actual) value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Last controller-requested value not yet confirmed by the device.
    pub fn expected_value(&self) -> Option<&Value> {
        self.expected_value.as_ref()
    }

    /// Store a value without any reconciliation.
    ///
    /// Use [`crate::Service::set_actual_value`] or
    /// [`crate::Service::set_expected_value`] to keep sibling
    /// characteristics consistent.
    pub fn set_value(&mut self, value: Value) {
        self.value = value;
    }

    pub(crate) fn store_actual(&mut self, value: Value) {
        self.value = value;
        self.expected_value = None;
    }

    pub(crate) fn store_expected(&mut self, value: Value) {
        self.value = value.clone();
        self.expected_value = Some(value);
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn set_valid(&mut self, valid: bool) {
        self.valid = valid;
    }

    pub fn is_always_null(&self) -> bool {
        ALWAYS_NULL.contains(&self.type_id)
    }

    pub fn immediate_notify(&self) -> bool {
        IMMEDIATE_NOTIFY.contains(&self.type_id)
    }

    pub fn is_virtual(&self) -> bool {
        self.type_id == VIRTUAL_TYPE_ID
    }

    /// Value as a controller sees it.
    pub fn client_value(&self) -> Value {
        if self.is_always_null() {
            return Value::Null;
        }
        Transformer::to_client(self, &self.value)
    }

    /// Format and constraint metadata.
    pub fn get_meta(&self) -> Map<String, Value> {
        let mut meta = Map::new();
        meta.insert("format".into(), json!(self.data_type.as_str()));

        let c = &self.constraints;

        if self.data_type.is_numeric() {
            if let Some(max) = c.max_value {
                meta.insert("maxValue".into(), number(max));
            }
            if let Some(min) = c.min_value {
                meta.insert("minValue".into(), number(min));
            }
            if let Some(step) = c.min_step {
                meta.insert("minStep".into(), number(step));
            }
            if let Some(unit) = c.unit {
                meta.insert("unit".into(), json!(unit.as_str()));
            }
            if let Some(valid) = &c.valid_values {
                meta.insert("valid-values".into(), json!(valid));
            }
        }

        if self.data_type == DataType::String {
            if let Some(max_length) = c.max_length {
                if max_length != DEFAULT_MAX_LENGTH {
                    meta.insert("maxLen".into(), json!(max_length.min(ABSOLUTE_MAX_LENGTH)));
                }
            }
        }

        meta
    }

    /// JSON representation for `/accessories` and `/characteristics`.
    pub fn to_hap(&self, iid: u64) -> Value {
        let mut hap = Map::new();
        hap.insert("iid".into(), json!(iid));
        hap.insert("type".into(), json!(uuid_to_hap_type(&self.type_id)));
        hap.insert(
            "perms".into(),
            json!(self
                .permissions
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()),
        );
        hap.extend(self.get_meta());

        if self.has_permission(Permission::Read) {
            hap.insert("value".into(), self.client_value());
        }

        hap.insert("ev".into(), json!(self.has_permission(Permission::Notify)));

        Value::Object(hap)
    }
}

fn check_max_length(name: &str, constraints: &Constraints) -> Result<()> {
    match constraints.max_length {
        Some(max_length) if max_length > ABSOLUTE_MAX_LENGTH => {
            Err(Error::invalid_argument(format!(
                "Characteristic {} max length {} exceeds allowed maximum {}",
                name, max_length, ABSOLUTE_MAX_LENGTH
            )))
        }
        _ => Ok(()),
    }
}

/// Render whole floats as integers so `100.0` serializes as `100`.
fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        json!(value as i64)
    } else {
        json!(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hap_core::hap_type_to_uuid;

    fn brightness() -> Characteristic {
        Characteristic::new(
            hap_type_to_uuid("8").unwrap(),
            "Brightness",
            DataType::Int,
            vec![Permission::Read, Permission::Write, Permission::Notify],
            Constraints {
                min_value: Some(0.0),
                max_value: Some(100.0),
                min_step: Some(1.0),
                unit: Some(Unit::Percentage),
                ..Default::default()
            },
        )
        .unwrap()
        .with_value(json!(42))
    }

    fn name(max_length: Option<usize>, permissions: Vec<Permission>) -> Characteristic {
        Characteristic::new(
            hap_type_to_uuid("23").unwrap(),
            "Name",
            DataType::String,
            permissions,
            Constraints {
                max_length,
                ..Default::default()
            },
        )
        .unwrap()
        .with_value(json!("Lamp"))
    }

    mod construction {
        use super::*;

        #[test]
        fn oversized_max_length_fails() {
            let result = Characteristic::new(
                Uuid::nil(),
                "Name",
                DataType::String,
                vec![],
                Constraints {
                    max_length: Some(257),
                    ..Default::default()
                },
            );
            assert!(matches!(result, Err(Error::InvalidArgument(_))));
        }

        #[test]
        fn derived_flags() {
            let switch_event = Characteristic::new(
                PROGRAMMABLE_SWITCH_EVENT,
                "ProgrammableSwitchEvent",
                DataType::Uint8,
                vec![Permission::Read, Permission::Notify],
                Constraints::default(),
            )
            .unwrap()
            .with_value(json!(1));

            assert!(switch_event.is_always_null());
            assert!(switch_event.immediate_notify());
            assert_eq!(switch_event.client_value(), Value::Null);
            assert!(!switch_event.is_virtual());
            assert!(!brightness().immediate_notify());
        }

        #[test]
        fn expected_value_is_cleared_by_actual() {
            let mut c = brightness();
            c.store_expected(json!(10));
            assert_eq!(c.expected_value(), Some(&json!(10)));
            c.store_actual(json!(12));
            assert_eq!(c.expected_value(), None);
            assert_eq!(c.value(), &json!(12));
        }
    }

    mod serialization {
        use super::*;

        #[test]
        fn numeric_characteristic() {
            let hap = brightness().to_hap(10);
            assert_eq!(
                hap,
                json!({
                    "iid": 10,
                    "type": "8",
                    "perms": ["pr", "pw", "ev"],
                    "format": "int",
                    "maxValue": 100,
                    "minValue": 0,
                    "minStep": 1,
                    "unit": "percentage",
                    "value": 42,
                    "ev": true
                })
            );
        }

        #[test]
        fn value_requires_read_permission() {
            let hap = name(None, vec![Permission::Write]).to_hap(1);
            assert!(hap.get("value").is_none());
            assert_eq!(hap["ev"], json!(false));
        }

        #[test]
        fn string_has_no_numeric_meta() {
            let hap = name(None, vec![Permission::Read]).to_hap(1);
            assert!(hap.get("minValue").is_none());
            assert!(hap.get("unit").is_none());
            assert!(hap.get("maxLen").is_none());
            assert_eq!(hap["value"], json!("Lamp"));
        }

        #[test]
        fn max_len_only_when_not_default() {
            let default = name(Some(DEFAULT_MAX_LENGTH), vec![Permission::Read]).to_hap(1);
            assert!(default.get("maxLen").is_none());

            let custom = name(Some(128), vec![Permission::Read]).to_hap(1);
            assert_eq!(custom["maxLen"], json!(128));
        }
    }
}
