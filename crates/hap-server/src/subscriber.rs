//! Characteristic notifications.
//!
//! Connections register an outbound channel; controllers subscribe to
//! individual characteristics with `ev`. Published values are framed as
//! `EVENT/1.0` messages and pushed to every subscribed connection except the
//! one that caused the change.

use crate::http::event_frame;
use hap_model::{Accessory, ObjectId};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Delay applied to notifications that are not marked immediate.
pub const EVENT_DELAY: Duration = Duration::from_millis(500);

pub type EventSender = mpsc::UnboundedSender<Vec<u8>>;

#[derive(Default)]
pub struct Subscriber {
    connections: HashMap<u64, EventSender>,
    subscriptions: HashMap<(u64, u64), HashSet<u64>>,
}

impl Subscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, connection: u64, events: EventSender) {
        self.connections.insert(connection, events);
    }

    /// Forget a connection and all of its subscriptions.
    pub fn unregister(&mut self, connection: u64) {
        self.connections.remove(&connection);
        self.subscriptions.retain(|_, subscribers| {
            subscribers.remove(&connection);
            !subscribers.is_empty()
        });
    }

    pub fn subscribe(&mut self, connection: u64, aid: u64, iid: u64) {
        debug!(connection, aid, iid, "Subscribed");
        self.subscriptions
            .entry((aid, iid))
            .or_default()
            .insert(connection);
    }

    pub fn unsubscribe(&mut self, connection: u64, aid: u64, iid: u64) {
        if let Some(subscribers) = self.subscriptions.get_mut(&(aid, iid)) {
            subscribers.remove(&connection);
            if subscribers.is_empty() {
                self.subscriptions.remove(&(aid, iid));
            }
            debug!(connection, aid, iid, "Unsubscribed");
        }
    }

    pub fn is_subscribed(&self, connection: u64, aid: u64, iid: u64) -> bool {
        self.subscriptions
            .get(&(aid, iid))
            .is_some_and(|subscribers| subscribers.contains(&connection))
    }

    /// Notify subscribers of `aid.iid` about a new value.
    ///
    /// Null values are never sent. `sender` is the connection that caused
    /// the change and does not receive its own update.
    pub fn publish(&self, aid: u64, iid: u64, value: Value, immediate: bool, sender: Option<u64>) {
        if value.is_null() {
            return;
        }

        let Some(subscribers) = self.subscriptions.get(&(aid, iid)) else {
            return;
        };

        let targets: Vec<EventSender> = subscribers
            .iter()
            .filter(|connection| Some(**connection) != sender)
            .filter_map(|connection| self.connections.get(connection).cloned())
            .collect();

        if targets.is_empty() {
            return;
        }

        let frame = event_frame(&json!({
            "characteristics": [{ "aid": aid, "iid": iid, "value": value }]
        }));
        trace!(aid, iid, targets = targets.len(), immediate, "Publishing event");

        if immediate {
            deliver(&targets, &frame);
        } else {
            tokio::spawn(async move {
                tokio::time::sleep(EVENT_DELAY).await;
                deliver(&targets, &frame);
            });
        }
    }

    /// Publish every changed characteristic of an accessory.
    pub fn publish_changes(
        &self,
        accessory: &Accessory,
        aid: u64,
        changed: &[ObjectId],
        sender: Option<u64>,
    ) {
        for object in changed {
            let (Some(characteristic), Some(iid)) =
                (accessory.characteristic(*object), accessory.iid(object))
            else {
                continue;
            };
            if characteristic.is_virtual() {
                continue;
            }

            self.publish(
                aid,
                iid,
                characteristic.client_value(),
                characteristic.immediate_notify(),
                sender,
            );
        }
    }
}

fn deliver(targets: &[EventSender], frame: &[u8]) {
    for target in targets {
        // A closed channel means the connection is going away.
        let _ = target.send(frame.to_vec());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpResponse;

    fn connect(subscriber: &mut Subscriber, connection: u64) -> mpsc::UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        subscriber.register(connection, tx);
        rx
    }

    fn event_body(frame: &[u8]) -> Value {
        let text = std::str::from_utf8(frame).unwrap();
        let (_, body) = text.split_once("\r\n\r\n").unwrap();
        serde_json::from_str(body).unwrap()
    }

    mod subscriptions {
        use super::*;

        #[test]
        fn subscribe_and_unsubscribe() {
            let mut subscriber = Subscriber::new();
            subscriber.subscribe(1, 2, 10);
            assert!(subscriber.is_subscribed(1, 2, 10));
            assert!(!subscriber.is_subscribed(2, 2, 10));

            subscriber.unsubscribe(1, 2, 10);
            assert!(!subscriber.is_subscribed(1, 2, 10));
        }

        #[tokio::test]
        async fn unregister_drops_subscriptions() {
            let mut subscriber = Subscriber::new();
            let _rx = connect(&mut subscriber, 1);
            subscriber.subscribe(1, 2, 10);
            subscriber.subscribe(1, 3, 11);

            subscriber.unregister(1);
            assert!(!subscriber.is_subscribed(1, 2, 10));
            assert!(!subscriber.is_subscribed(1, 3, 11));
        }
    }

    mod publishing {
        use super::*;

        #[tokio::test]
        async fn immediate_event_skips_sender() {
            let mut subscriber = Subscriber::new();
            let mut first = connect(&mut subscriber, 1);
            let mut second = connect(&mut subscriber, 2);
            subscriber.subscribe(1, 2, 10);
            subscriber.subscribe(2, 2, 10);

            subscriber.publish(2, 10, json!(true), true, Some(1));

            let frame = second.try_recv().unwrap();
            assert!(frame.starts_with(b"EVENT/1.0 200 OK\r\n"));
            assert_eq!(
                event_body(&frame),
                json!({"characteristics": [{"aid": 2, "iid": 10, "value": true}]})
            );
            assert!(first.try_recv().is_err());
        }

        #[tokio::test]
        async fn null_values_are_not_sent() {
            let mut subscriber = Subscriber::new();
            let mut rx = connect(&mut subscriber, 1);
            subscriber.subscribe(1, 2, 10);

            subscriber.publish(2, 10, Value::Null, true, None);
            assert!(rx.try_recv().is_err());
        }

        #[tokio::test]
        async fn unsubscribed_characteristic_is_silent() {
            let mut subscriber = Subscriber::new();
            let mut rx = connect(&mut subscriber, 1);
            subscriber.subscribe(1, 2, 10);

            subscriber.publish(2, 11, json!(5), true, None);
            assert!(rx.try_recv().is_err());
        }

        #[tokio::test(start_paused = true)]
        async fn regular_events_are_delayed() {
            let mut subscriber = Subscriber::new();
            let mut rx = connect(&mut subscriber, 1);
            subscriber.subscribe(1, 2, 10);

            let started = tokio::time::Instant::now();
            subscriber.publish(2, 10, json!(42), false, None);
            assert!(rx.try_recv().is_err());

            let frame = rx.recv().await.unwrap();
            assert!(started.elapsed() >= EVENT_DELAY);
            assert_eq!(event_body(&frame)["characteristics"][0]["value"], json!(42));
        }

        #[test]
        fn event_frame_parses_as_response_head() {
            let frame = event_frame(&json!({"characteristics": []}));
            let parsed = HttpResponse::parse(&frame).unwrap();
            assert_eq!(parsed.status, 200);
        }
    }
}
