//! Applies device reports as they arrive.

use super::{apply_device_value, Writer};
use crate::subscriber::Subscriber;
use crate::traits::PropertyEvent;
use futures::StreamExt;
use hap_model::Bridge;
use std::cell::RefCell;
use std::rc::Rc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, info, warn};

pub struct EventWriter {
    bridge: Rc<RefCell<Bridge>>,
    subscriber: Rc<RefCell<Subscriber>>,
    events: broadcast::Receiver<PropertyEvent>,
    task: Option<JoinHandle<()>>,
}

impl EventWriter {
    /// Every connect resubscribes to `events`, reports sent while
    /// disconnected are not replayed.
    pub fn new(
        bridge: Rc<RefCell<Bridge>>,
        subscriber: Rc<RefCell<Subscriber>>,
        events: broadcast::Receiver<PropertyEvent>,
    ) -> Self {
        Self {
            bridge,
            subscriber,
            events,
            task: None,
        }
    }
}

impl Writer for EventWriter {
    /// Must be called from within a `LocalSet`.
    fn connect(&mut self) {
        if self.is_connected() {
            return;
        }

        let bridge = self.bridge.clone();
        let subscriber = self.subscriber.clone();
        let mut events = BroadcastStream::new(self.events.resubscribe());

        self.task = Some(tokio::task::spawn_local(async move {
            info!("Event writer started");
            while let Some(event) = events.next().await {
                match event {
                    Ok(event) => {
                        let changed = apply_device_value(
                            &mut bridge.borrow_mut(),
                            &subscriber.borrow(),
                            event.property,
                            &event.value,
                        );
                        debug!(property = %event.property, changed, "Device event applied");
                    }
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event writer lagged behind device reports");
                    }
                }
            }
            info!("Event stream closed");
        }));
    }

    fn disconnect(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("Event writer stopped");
        }
    }

    fn is_connected(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for EventWriter {
    fn drop(&mut self) {
        self.disconnect();
    }
}
