//! In-process device exchange.
//!
//! Holds property state in memory and broadcasts device reports. The daemon
//! uses it when no external device backend is attached, and tests drive the
//! writers through it.

use crate::traits::{DeviceExchange, PropertyEvent, PropertyState};
use async_trait::async_trait;
use hap_core::error::Result;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use uuid::Uuid;

const EVENT_CAPACITY: usize = 64;

pub struct MemoryExchange {
    states: RwLock<HashMap<Uuid, PropertyState>>,
    events: broadcast::Sender<PropertyEvent>,
}

impl Default for MemoryExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryExchange {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            states: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Stream of device reports.
    pub fn subscribe(&self) -> broadcast::Receiver<PropertyEvent> {
        self.events.subscribe()
    }

    /// Record a value reported by the device. Confirms any pending request.
    pub async fn report(&self, property: Uuid, value: Value) {
        self.states
            .write()
            .await
            .insert(property, PropertyState::new(value.clone()));

        debug!(%property, %value, "Device reported property state");
        // No receivers is not an error, nobody is listening yet.
        let _ = self.events.send(PropertyEvent { property, value });
    }
}

#[async_trait]
impl DeviceExchange for MemoryExchange {
    async fn read_state(&self, property: Uuid) -> Result<Option<PropertyState>> {
        Ok(self.states.read().await.get(&property).cloned())
    }

    async fn write_state(&self, property: Uuid, value: Value) -> Result<()> {
        let mut states = self.states.write().await;
        let state = states
            .entry(property)
            .or_insert_with(|| PropertyState::new(Value::Null));
        state.expected = Some(value);
        debug!(%property, "Property write requested");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn write_is_pending_until_reported() {
        let exchange = MemoryExchange::new();
        let property = Uuid::from_u128(7);

        exchange.write_state(property, json!(40)).await.unwrap();
        let state = exchange.read_state(property).await.unwrap().unwrap();
        assert_eq!(state.actual, Value::Null);
        assert_eq!(state.effective(), &json!(40));

        exchange.report(property, json!(41)).await;
        let state = exchange.read_state(property).await.unwrap().unwrap();
        assert_eq!(state.expected, None);
        assert_eq!(state.effective(), &json!(41));
    }

    #[tokio::test]
    async fn reports_are_broadcast() {
        let exchange = MemoryExchange::new();
        let mut events = exchange.subscribe();

        exchange.report(Uuid::from_u128(1), json!(true)).await;

        let event = events.recv().await.unwrap();
        assert_eq!(event.property, Uuid::from_u128(1));
        assert_eq!(event.value, json!(true));
    }

    #[tokio::test]
    async fn unknown_property_has_no_state() {
        let exchange = MemoryExchange::new();
        assert!(exchange.read_state(Uuid::nil()).await.unwrap().is_none());
    }
}
