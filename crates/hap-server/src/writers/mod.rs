//! Background tasks moving device state into the accessory graph.
//!
//! Both writers run on the server's local task set and share the graph
//! through `Rc<RefCell<..>>`; borrows are never held across an await.

mod event;
mod periodic;

pub use event::EventWriter;
pub use periodic::{PeriodicSync, PeriodicWriter, DEBOUNCE, START_DELAY, TICK};

use crate::subscriber::Subscriber;
use hap_model::Bridge;
use serde_json::Value;
use tracing::{trace, warn};
use uuid::Uuid;

/// A background task that can be started and stopped.
pub trait Writer {
    fn connect(&mut self);
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;
}

/// Store a device value in every characteristic bound to `property` and
/// publish what changed. Returns the number of changed characteristics.
pub(crate) fn apply_device_value(
    bridge: &mut Bridge,
    subscriber: &Subscriber,
    property: Uuid,
    value: &Value,
) -> usize {
    let mut total = 0;

    for (aid, object) in bridge.characteristics_for_property(property) {
        let Some(accessory) = bridge.find_accessory_mut(aid) else {
            continue;
        };

        match accessory.set_actual_value(object, value.clone()) {
            Ok(changed) => {
                trace!(aid, %property, changed = changed.len(), "Applied device value");
                subscriber.publish_changes(accessory, aid, &changed, None);
                total += changed.len();
            }
            Err(e) => warn!(aid, %property, error = %e, "Device value rejected"),
        }
    }

    total
}
