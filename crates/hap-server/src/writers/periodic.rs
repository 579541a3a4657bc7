//! Polls mapped properties and folds their device state back into the graph.

use super::{apply_device_value, Writer};
use crate::subscriber::Subscriber;
use crate::traits::DeviceExchange;
use hap_model::Bridge;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Delay before the first poll after connecting.
pub const START_DELAY: Duration = Duration::from_secs(5);

/// Poll tick. One property is handled per tick.
pub const TICK: Duration = Duration::from_millis(10);

/// Minimum time between two updates of the same property.
pub const DEBOUNCE: Duration = Duration::from_secs(2);

/// One polling pass at a time over the mapped properties.
pub struct PeriodicSync {
    bridge: Rc<RefCell<Bridge>>,
    subscriber: Rc<RefCell<Subscriber>>,
    exchange: Arc<dyn DeviceExchange>,
    last_update: HashMap<Uuid, Instant>,
    cursor: Option<Uuid>,
}

impl PeriodicSync {
    pub fn new(
        bridge: Rc<RefCell<Bridge>>,
        subscriber: Rc<RefCell<Subscriber>>,
        exchange: Arc<dyn DeviceExchange>,
    ) -> Self {
        Self {
            bridge,
            subscriber,
            exchange,
            last_update: HashMap::new(),
            cursor: None,
        }
    }

    /// Handle the next mapped property that is out of its debounce window.
    ///
    /// Returns the property when its characteristics were updated.
    pub async fn step(&mut self) -> Option<Uuid> {
        let property = self.next_due()?;
        self.cursor = Some(property);

        let state = match self.exchange.read_state(property).await {
            Ok(Some(state)) => state,
            Ok(None) => return None,
            Err(e) => {
                warn!(%property, error = %e, "Reading property state failed");
                return None;
            }
        };
        let value = state.effective().clone();

        let mut bridge = self.bridge.borrow_mut();
        let outdated = bridge
            .characteristics_for_property(property)
            .into_iter()
            .any(|(aid, object)| {
                bridge
                    .find_accessory(aid)
                    .and_then(|accessory| accessory.characteristic(object))
                    .is_some_and(|characteristic| characteristic.value() != &value)
            });
        if !outdated {
            return None;
        }

        apply_device_value(&mut bridge, &self.subscriber.borrow(), property, &value);
        self.last_update.insert(property, Instant::now());
        debug!(%property, %value, "Mapped property synchronized");
        Some(property)
    }

    /// Round robin over mapped properties, starting after the cursor.
    fn next_due(&self) -> Option<Uuid> {
        let properties = self.mapped_properties();
        let now = Instant::now();

        let after = self
            .cursor
            .map(|cursor| properties.range((std::ops::Bound::Excluded(cursor), std::ops::Bound::Unbounded)))
            .into_iter()
            .flatten();
        after
            .chain(properties.iter())
            .find(|property| {
                self.last_update
                    .get(property)
                    .map_or(true, |last| now.duration_since(*last) >= DEBOUNCE)
            })
            .copied()
    }

    fn mapped_properties(&self) -> BTreeSet<Uuid> {
        let bridge = self.bridge.borrow();
        std::iter::once(bridge.accessory())
            .chain(bridge.accessories().iter())
            .flat_map(|accessory| accessory.services().iter())
            .flat_map(|service| service.characteristics().iter())
            .filter_map(|characteristic| characteristic.property())
            .filter(|property| property.is_mapped())
            .map(|property| property.id)
            .collect()
    }
}

/// Runs [`PeriodicSync`] on a timer.
pub struct PeriodicWriter {
    bridge: Rc<RefCell<Bridge>>,
    subscriber: Rc<RefCell<Subscriber>>,
    exchange: Arc<dyn DeviceExchange>,
    task: Option<JoinHandle<()>>,
}

impl PeriodicWriter {
    pub fn new(
        bridge: Rc<RefCell<Bridge>>,
        subscriber: Rc<RefCell<Subscriber>>,
        exchange: Arc<dyn DeviceExchange>,
    ) -> Self {
        Self {
            bridge,
            subscriber,
            exchange,
            task: None,
        }
    }
}

impl Writer for PeriodicWriter {
    /// Must be called from within a `LocalSet`.
    fn connect(&mut self) {
        if self.is_connected() {
            return;
        }

        let mut sync = PeriodicSync::new(
            self.bridge.clone(),
            self.subscriber.clone(),
            self.exchange.clone(),
        );
        self.task = Some(tokio::task::spawn_local(async move {
            tokio::time::sleep(START_DELAY).await;
            info!("Periodic writer started");

            let mut tick = tokio::time::interval(TICK);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                sync.step().await;
            }
        }));
    }

    fn disconnect(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("Periodic writer stopped");
        }
    }

    fn is_connected(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for PeriodicWriter {
    fn drop(&mut self) {
        self.disconnect();
    }
}
