//! Seam between the server and the devices behind the bridge.

use async_trait::async_trait;
use hap_core::error::Result;
use serde_json::Value;
use uuid::Uuid;

/// Last known state of a device property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyState {
    /// Value the device reported.
    pub actual: Value,
    /// Value requested but not yet confirmed, if any.
    pub expected: Option<Value>,
}

impl PropertyState {
    pub fn new(actual: Value) -> Self {
        Self {
            actual,
            expected: None,
        }
    }

    /// The value a controller should see: pending request first.
    pub fn effective(&self) -> &Value {
        self.expected.as_ref().unwrap_or(&self.actual)
    }
}

/// A state change reported by a device.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyEvent {
    pub property: Uuid,
    pub value: Value,
}

/// Access to device property state.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait DeviceExchange: Send + Sync {
    /// Current state of a property, `None` when the device does not know it.
    async fn read_state(&self, property: Uuid) -> Result<Option<PropertyState>>;

    /// Request the device to apply a value.
    async fn write_state(&self, property: Uuid, value: Value) -> Result<()>;
}
