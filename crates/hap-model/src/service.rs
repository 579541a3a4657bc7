//! HAP service: a group of characteristics describing one function of an
//! accessory.

use crate::characteristic::Characteristic;
use crate::color;
use crate::iid::{IidManager, ObjectId};
use hap_core::error::{Error, Result};
use hap_core::uuid_to_hap_type;
use serde_json::{json, Value};
use tracing::trace;
use uuid::{uuid, Uuid};

pub const ACCESSORY_INFORMATION: &str = "AccessoryInformation";
pub const PROTOCOL_INFORMATION: &str = "ProtocolInformation";
pub const LIGHTBULB: &str = "Lightbulb";

pub const PROTOCOL_INFORMATION_TYPE_ID: Uuid = uuid!("000000A2-0000-1000-8000-0026BB765291");

const VIRTUAL_TYPE_ID: Uuid = Uuid::nil();

#[derive(Debug, Clone)]
pub struct Service {
    type_id: Uuid,
    name: String,
    channel: Option<Uuid>,
    required: Vec<String>,
    optional: Vec<String>,
    virtual_names: Vec<String>,
    primary: bool,
    hidden: bool,
    characteristics: Vec<Characteristic>,
}

impl Service {
    pub fn new(
        type_id: Uuid,
        name: impl Into<String>,
        required: Vec<String>,
        optional: Vec<String>,
        virtual_names: Vec<String>,
    ) -> Self {
        Self {
            type_id,
            name: name.into(),
            channel: None,
            required,
            optional,
            virtual_names,
            primary: false,
            hidden: false,
            characteristics: Vec::new(),
        }
    }

    /// Bind the service to the device channel it represents.
    pub fn with_channel(mut self, channel: Uuid) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn type_id(&self) -> Uuid {
        self.type_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel(&self) -> Option<Uuid> {
        self.channel
    }

    pub fn required_characteristics(&self) -> &[String] {
        &self.required
    }

    pub fn allowed_characteristics(&self) -> impl Iterator<Item = &String> {
        self.required
            .iter()
            .chain(self.optional.iter())
            .chain(self.virtual_names.iter())
    }

    /// Add a characteristic allowed for this service type. Returns its index.
    pub fn add_characteristic(&mut self, characteristic: Characteristic) -> Result<usize> {
        if !self
            .allowed_characteristics()
            .any(|name| name == characteristic.name())
        {
            return Err(Error::invalid_argument(format!(
                "Characteristic {} is not allowed for service {}",
                characteristic.name(),
                self.name
            )));
        }

        self.characteristics.push(characteristic);
        Ok(self.characteristics.len() - 1)
    }

    pub fn characteristics(&self) -> &[Characteristic] {
        &self.characteristics
    }

    pub fn characteristic(&self, index: usize) -> Option<&Characteristic> {
        self.characteristics.get(index)
    }

    pub fn characteristic_mut(&mut self, index: usize) -> Option<&mut Characteristic> {
        self.characteristics.get_mut(index)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.characteristics.iter().position(|c| c.name() == name)
    }

    pub fn find_characteristic(&self, name: &str) -> Option<&Characteristic> {
        self.characteristics.iter().find(|c| c.name() == name)
    }

    pub fn find_characteristic_mut(&mut self, name: &str) -> Option<&mut Characteristic> {
        self.characteristics.iter_mut().find(|c| c.name() == name)
    }

    pub fn has_characteristic(&self, name: &str) -> bool {
        self.find_characteristic(name).is_some()
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn set_primary(&mut self, primary: bool) {
        self.primary = primary;
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn set_hidden(&mut self, hidden: bool) {
        self.hidden = hidden;
    }

    pub fn is_virtual(&self) -> bool {
        self.type_id == VIRTUAL_TYPE_ID
    }

    /// Store a device reported value and reconcile dependent characteristics.
    ///
    /// Returns the indices of every characteristic whose value changed.
    pub fn set_actual_value(&mut self, index: usize, value: Value) -> Result<Vec<usize>> {
        self.write(index, value, true)
    }

    /// Store a controller requested value and reconcile dependent
    /// characteristics.
    pub fn set_expected_value(&mut self, index: usize, value: Value) -> Result<Vec<usize>> {
        self.write(index, value, false)
    }

    /// Accept the pending controller value as the actual one, without
    /// reconciling siblings again.
    pub fn confirm_value(&mut self, index: usize) -> Result<()> {
        let characteristic = self.characteristic_at(index)?;
        let value = characteristic.value().clone();
        characteristic.store_actual(value);
        Ok(())
    }

    fn characteristic_at(&mut self, index: usize) -> Result<&mut Characteristic> {
        let name = &self.name;
        self.characteristics.get_mut(index).ok_or_else(|| {
            Error::invalid_argument(format!("Service {} has no characteristic {}", name, index))
        })
    }

    fn write(&mut self, index: usize, value: Value, from_device: bool) -> Result<Vec<usize>> {
        let characteristic = self.characteristic_at(index)?;

        let mut changed = Vec::new();
        if characteristic.value() != &value {
            changed.push(index);
        }

        if from_device {
            characteristic.store_actual(value);
        } else {
            characteristic.store_expected(value);
        }

        let trigger = characteristic.name().to_string();
        for update in self.recalculate_values(&trigger, from_device) {
            if let Some(sibling) = self.characteristics.get_mut(update.index) {
                if sibling.value() != &update.value {
                    trace!(
                        service = %self.name,
                        characteristic = sibling.name(),
                        value = %update.value,
                        "Reconciled value"
                    );
                    // Device bound channels hold actual values, mapped ones wait for the device.
                    let actual = sibling
                        .property()
                        .map_or(from_device, |p| !p.is_mapped());
                    if actual {
                        sibling.store_actual(update.value);
                    } else {
                        sibling.store_expected(update.value);
                    }
                    if !changed.contains(&update.index) {
                        changed.push(update.index);
                    }
                }
            }
        }

        Ok(changed)
    }

    /// Sibling writes caused by a change of `trigger`. Only light bulbs
    /// reconcile values today.
    pub fn recalculate_values(&self, trigger: &str, from_device: bool) -> Vec<color::Update> {
        if self.name == LIGHTBULB {
            color::reconcile(self, trigger, from_device)
        } else {
            Vec::new()
        }
    }

    pub fn to_hap(&self, service_index: usize, iids: &IidManager<ObjectId>) -> Value {
        let characteristics: Vec<Value> = self
            .characteristics
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_virtual())
            .filter_map(|(index, c)| {
                let iid = iids.get_iid(&ObjectId::Characteristic {
                    service: service_index,
                    index,
                })?;
                Some(c.to_hap(iid))
            })
            .collect();

        json!({
            "iid": iids.get_iid(&ObjectId::Service(service_index)),
            "type": uuid_to_hap_type(&self.type_id),
            "characteristics": characteristics,
            "primary": self.primary,
            "hidden": self.hidden,
        })
    }
}
