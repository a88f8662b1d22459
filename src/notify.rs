//! Store-Error Notification channel.
//!
//! Store-wide failures (open, migrate, reset) affect every context attached
//! to a coordinator, so they are broadcast instead of returned: any observer
//! may subscribe to the hub registered under the store's well-known topic
//! name. Context-local failures never travel through this channel.

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, OnceLock};

/// Kind of store-level failure carried by a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreErrorKind {
    /// The physical store could not be opened.
    OpenFailed,
    /// The store opened but its on-disk schema does not match the model.
    MigrationFailed,
    /// Destroy-and-recreate failed; the store may be left unusable.
    ResetFailed,
}

/// Broadcast payload: failure kind plus the underlying cause.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreErrorNotification {
    pub kind: StoreErrorKind,
    pub cause: String,
    /// RFC 3339 timestamp with millisecond precision.
    pub ts: String,
}

impl StoreErrorNotification {
    pub fn now(kind: StoreErrorKind, cause: impl Into<String>) -> Self {
        Self {
            kind,
            cause: cause.into(),
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// In-process pub/sub hub for store-error notifications.
///
/// Delivery is at-least-once per live subscriber; receivers whose far end has
/// been dropped are pruned on the next broadcast.
#[derive(Default)]
pub struct NotificationHub {
    subscribers: Mutex<Vec<Sender<StoreErrorNotification>>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<StoreErrorNotification> {
        let (sender, receiver) = channel();
        self.subscribers.lock().push(sender);
        receiver
    }

    pub fn broadcast(&self, notification: &StoreErrorNotification) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|s| s.send(notification.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

/// Well-known topic name for a store location's error notifications.
pub fn store_error_topic(location: &str) -> String {
    format!("strata.store-error.{location}")
}

fn registry() -> &'static Mutex<HashMap<String, Arc<NotificationHub>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, Arc<NotificationHub>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Get or create the hub registered under a topic. Called by the coordinator
/// at construction; observers may call it directly to subscribe by topic name
/// before or after the coordinator exists.
pub fn register_hub(topic: &str) -> Arc<NotificationHub> {
    registry()
        .lock()
        .entry(topic.to_string())
        .or_insert_with(|| Arc::new(NotificationHub::new()))
        .clone()
}

/// Look up a hub without creating it.
pub fn hub_for_topic(topic: &str) -> Option<Arc<NotificationHub>> {
    registry().lock().get(topic).cloned()
}

/// Remove a topic's hub if the caller held the last coordinator reference.
/// Subscribers holding the hub directly keep it alive; only the registry
/// entry goes away.
pub fn deregister_hub(topic: &str) {
    let mut registry = registry().lock();
    if let Some(hub) = registry.get(topic) {
        // Two strong refs mean only the registry and the dropping coordinator
        // hold it; no other coordinator shares this topic.
        if Arc::strong_count(hub) <= 2 {
            registry.remove(topic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_reaches_all_subscribers() {
        let hub = NotificationHub::new();
        let a = hub.subscribe();
        let b = hub.subscribe();

        hub.broadcast(&StoreErrorNotification::now(
            StoreErrorKind::OpenFailed,
            "disk full",
        ));

        assert_eq!(a.recv().unwrap().kind, StoreErrorKind::OpenFailed);
        assert_eq!(b.recv().unwrap().cause, "disk full");
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let hub = NotificationHub::new();
        let alive = hub.subscribe();
        drop(hub.subscribe());
        assert_eq!(hub.subscriber_count(), 2);

        hub.broadcast(&StoreErrorNotification::now(
            StoreErrorKind::ResetFailed,
            "file locked",
        ));
        assert_eq!(hub.subscriber_count(), 1);
        assert!(alive.try_recv().is_ok());
    }

    #[test]
    fn registry_returns_same_hub_per_topic() {
        let topic = store_error_topic("test-registry-topic");
        let a = register_hub(&topic);
        let b = register_hub(&topic);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(hub_for_topic(&topic).is_some());
    }

    #[test]
    fn notification_serializes_with_snake_case_kind() {
        let n = StoreErrorNotification::now(StoreErrorKind::MigrationFailed, "schema drift");
        let json = serde_json::to_string(&n).unwrap();
        assert!(json.contains("\"migration_failed\""));
        assert!(json.contains("schema drift"));
    }
}
