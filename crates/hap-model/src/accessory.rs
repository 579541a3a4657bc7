//! Accessories and the bridge that exposes them.

use crate::catalog::Catalog;
use crate::characteristic::Characteristic;
use crate::iid::{IidManager, ObjectId};
use crate::service::{Service, ACCESSORY_INFORMATION, PROTOCOL_INFORMATION};
use hap_core::error::{Error, Result};
use hap_core::types::{HAP_PROTOCOL_VERSION, STANDALONE_AID};
use hap_core::AccessoryCategory;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

/// Highest aid a bridge hands out to its accessories.
pub const MAX_BRIDGED_AID: u64 = 150;

/// Aid skipped during automatic allocation.
const RESERVED_AID: u64 = 7;

/// First aid tried during automatic allocation.
const FIRST_BRIDGED_AID: u64 = 2;

/// Contents of the mandatory AccessoryInformation service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessoryInfo {
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
    pub firmware_revision: String,
}

#[derive(Debug, Clone)]
pub struct Accessory {
    id: Uuid,
    name: String,
    aid: Option<u64>,
    category: AccessoryCategory,
    services: Vec<Service>,
    iids: IidManager<ObjectId>,
}

impl Accessory {
    /// Create an accessory with its AccessoryInformation service.
    pub fn new(
        catalog: &Catalog,
        info: AccessoryInfo,
        aid: Option<u64>,
        category: AccessoryCategory,
    ) -> Result<Self> {
        let mut accessory = Self {
            id: Uuid::new_v4(),
            name: info.name.clone(),
            aid,
            category,
            services: Vec::new(),
            iids: IidManager::new(),
        };

        let mut information = catalog.build_service(ACCESSORY_INFORMATION)?;
        let values = [
            ("Identify", json!(false)),
            ("Manufacturer", json!(info.manufacturer)),
            ("Model", json!(info.model)),
            ("Name", json!(info.name)),
            ("SerialNumber", json!(info.serial_number)),
            ("FirmwareRevision", json!(info.firmware_revision)),
        ];
        for (name, value) in values {
            let characteristic = catalog.build_characteristic(name)?.with_value(value);
            information.add_characteristic(characteristic)?;
        }
        accessory.add_service(information)?;

        Ok(accessory)
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aid(&self) -> Option<u64> {
        self.aid
    }

    pub fn category(&self) -> AccessoryCategory {
        self.category
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn service(&self, index: usize) -> Option<&Service> {
        self.services.get(index)
    }

    pub fn find_services<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Service> + 'a {
        self.services.iter().filter(move |s| s.name() == name)
    }

    /// Add a service and assign iids to it and its characteristics.
    /// Virtual services and characteristics get no iid.
    pub fn add_service(&mut self, service: Service) -> Result<usize> {
        let index = self.services.len();

        if !service.is_virtual() {
            self.iids.assign(ObjectId::Service(index));
            for (position, characteristic) in service.characteristics().iter().enumerate() {
                if !characteristic.is_virtual() {
                    self.iids.assign(ObjectId::Characteristic {
                        service: index,
                        index: position,
                    });
                }
            }
        }

        self.services.push(service);
        Ok(index)
    }

    /// Add a characteristic to an already added service.
    pub fn add_characteristic(
        &mut self,
        service_index: usize,
        characteristic: Characteristic,
    ) -> Result<ObjectId> {
        let service = self.services.get_mut(service_index).ok_or_else(|| {
            Error::invalid_argument(format!(
                "Accessory {} has no service {}",
                self.name, service_index
            ))
        })?;

        let assign = !service.is_virtual() && !characteristic.is_virtual();
        let index = service.add_characteristic(characteristic)?;
        let object = ObjectId::Characteristic {
            service: service_index,
            index,
        };

        if assign {
            self.iids.assign(object);
        }

        Ok(object)
    }

    pub fn iid(&self, object: &ObjectId) -> Option<u64> {
        self.iids.get_iid(object)
    }

    pub fn object(&self, iid: u64) -> Option<ObjectId> {
        self.iids.get_object(iid)
    }

    pub fn characteristic(&self, object: ObjectId) -> Option<&Characteristic> {
        match object {
            ObjectId::Characteristic { service, index } => {
                self.services.get(service)?.characteristic(index)
            }
            ObjectId::Service(_) => None,
        }
    }

    pub fn characteristic_mut(&mut self, object: ObjectId) -> Option<&mut Characteristic> {
        match object {
            ObjectId::Characteristic { service, index } => {
                self.services.get_mut(service)?.characteristic_mut(index)
            }
            ObjectId::Service(_) => None,
        }
    }

    pub fn characteristic_by_iid(&self, iid: u64) -> Option<&Characteristic> {
        self.characteristic(self.object(iid)?)
    }

    /// Every characteristic bound to the given device property.
    pub fn characteristics_for_property(&self, property: Uuid) -> Vec<ObjectId> {
        self.services
            .iter()
            .enumerate()
            .flat_map(|(service, s)| {
                s.characteristics()
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| c.property().is_some_and(|p| p.id == property))
                    .map(move |(index, _)| ObjectId::Characteristic { service, index })
            })
            .collect()
    }

    /// Store a device reported value. Returns every changed characteristic.
    pub fn set_actual_value(&mut self, object: ObjectId, value: Value) -> Result<Vec<ObjectId>> {
        self.write(object, value, true)
    }

    /// Store a controller requested value. Returns every changed characteristic.
    pub fn set_expected_value(&mut self, object: ObjectId, value: Value) -> Result<Vec<ObjectId>> {
        self.write(object, value, false)
    }

    /// Settle a controller write whose value needs no device round trip.
    pub fn confirm_value(&mut self, object: ObjectId) -> Result<()> {
        let (service, _, index) = self.locate(object)?;
        service.confirm_value(index)
    }

    fn locate(&mut self, object: ObjectId) -> Result<(&mut Service, usize, usize)> {
        let ObjectId::Characteristic {
            service: service_index,
            index,
        } = object
        else {
            return Err(Error::invalid_argument("Values can only be written to characteristics"));
        };

        let name = &self.name;
        let service = self.services.get_mut(service_index).ok_or_else(|| {
            Error::invalid_argument(format!("Accessory {} has no service {}", name, service_index))
        })?;
        Ok((service, service_index, index))
    }

    fn write(&mut self, object: ObjectId, value: Value, from_device: bool) -> Result<Vec<ObjectId>> {
        let (service, service_index, index) = self.locate(object)?;

        let changed = if from_device {
            service.set_actual_value(index, value)?
        } else {
            service.set_expected_value(index, value)?
        };

        Ok(changed
            .into_iter()
            .map(|index| ObjectId::Characteristic {
                service: service_index,
                index,
            })
            .collect())
    }

    pub fn to_hap(&self) -> Value {
        let services: Vec<Value> = self
            .services
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_virtual())
            .map(|(index, s)| s.to_hap(index, &self.iids))
            .collect();

        json!({
            "aid": self.aid,
            "services": services,
        })
    }
}

/// Root accessory owning the bridged accessories.
#[derive(Debug, Clone)]
pub struct Bridge {
    accessory: Accessory,
    accessories: Vec<Accessory>,
}

impl Bridge {
    /// Create the bridge accessory with aid 1 and its ProtocolInformation
    /// service.
    pub fn new(catalog: &Catalog, info: AccessoryInfo) -> Result<Self> {
        let mut accessory =
            Accessory::new(catalog, info, Some(STANDALONE_AID), AccessoryCategory::Bridge)?;

        let mut protocol = catalog.build_service(PROTOCOL_INFORMATION)?;
        let version = catalog
            .build_characteristic("Version")?
            .with_value(json!(HAP_PROTOCOL_VERSION));
        protocol.add_characteristic(version)?;
        accessory.add_service(protocol)?;

        Ok(Self {
            accessory,
            accessories: Vec::new(),
        })
    }

    pub fn accessory(&self) -> &Accessory {
        &self.accessory
    }

    pub fn accessory_mut(&mut self) -> &mut Accessory {
        &mut self.accessory
    }

    pub fn aid(&self) -> u64 {
        self.accessory.aid.unwrap_or(STANDALONE_AID)
    }

    pub fn accessories(&self) -> &[Accessory] {
        &self.accessories
    }

    /// Accessory by aid, the bridge itself included.
    pub fn find_accessory(&self, aid: u64) -> Option<&Accessory> {
        if aid == self.aid() {
            return Some(&self.accessory);
        }
        self.accessories.iter().find(|a| a.aid == Some(aid))
    }

    pub fn find_accessory_mut(&mut self, aid: u64) -> Option<&mut Accessory> {
        if aid == self.aid() {
            return Some(&mut self.accessory);
        }
        self.accessories.iter_mut().find(|a| a.aid == Some(aid))
    }

    /// Bridge an accessory, allocating an aid when it has none.
    pub fn add_accessory(&mut self, mut accessory: Accessory) -> Result<u64> {
        if accessory.category == AccessoryCategory::Bridge {
            return Err(Error::invalid_argument("Bridges cannot be bridged"));
        }

        let aid = match accessory.aid {
            Some(aid) => aid,
            None => self.next_aid()?,
        };

        if aid == self.aid() {
            return Err(Error::invalid_argument(
                "Accessory added to bridge could not have same AID",
            ));
        }

        if self.accessories.iter().any(|a| a.aid == Some(aid)) {
            return Err(Error::invalid_argument(format!(
                "Duplicate AID found when attempting to add accessory: {}",
                aid
            )));
        }

        debug!(aid, name = %accessory.name, "Bridged accessory");
        accessory.aid = Some(aid);
        self.accessories.push(accessory);
        Ok(aid)
    }

    fn next_aid(&self) -> Result<u64> {
        (FIRST_BRIDGED_AID..=MAX_BRIDGED_AID)
            .filter(|candidate| *candidate != RESERVED_AID && *candidate != self.aid())
            .find(|candidate| !self.accessories.iter().any(|a| a.aid == Some(*candidate)))
            .ok_or_else(|| {
                Error::invalid_argument(format!(
                    "Bridge cannot hold more than {} accessories",
                    MAX_BRIDGED_AID
                ))
            })
    }

    /// `(aid, characteristic)` of every characteristic bound to a property.
    pub fn characteristics_for_property(&self, property: Uuid) -> Vec<(u64, ObjectId)> {
        std::iter::once(&self.accessory)
            .chain(self.accessories.iter())
            .filter_map(|a| a.aid.map(|aid| (aid, a)))
            .flat_map(|(aid, a)| {
                a.characteristics_for_property(property)
                    .into_iter()
                    .map(move |object| (aid, object))
            })
            .collect()
    }

    /// Document served on `GET /accessories`, the bridge first.
    pub fn to_hap(&self) -> Value {
        let accessories: Vec<Value> = std::iter::once(&self.accessory)
            .chain(self.accessories.iter())
            .map(Accessory::to_hap)
            .collect();

        json!({ "accessories": accessories })
    }
}
