//! Notification fan-out to registered listeners.

use crate::messages::{FedNotify, NotifyEmit, UNotify};
use crate::observability::events;
use crate::security::Keys;
use crate::subscription::Attributes;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

const COMPONENT: &str = "delivery";

/// A notification as seen by the delivery core, whatever its origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub attributes: Attributes,
    pub deliver_insecure: bool,
    /// Producer keys attached to the message, hashed for the producer role.
    pub keys: Keys,
    /// Server domains already traversed. Empty for a local publish.
    pub routing: Vec<String>,
}

impl From<NotifyEmit> for Notification {
    fn from(message: NotifyEmit) -> Self {
        Self {
            attributes: message.attributes,
            deliver_insecure: message.deliver_insecure,
            keys: message.keys,
            routing: Vec::new(),
        }
    }
}

impl From<UNotify> for Notification {
    fn from(message: UNotify) -> Self {
        Self {
            attributes: message.attributes,
            deliver_insecure: message.deliver_insecure,
            keys: message.keys,
            routing: Vec::new(),
        }
    }
}

impl From<FedNotify> for Notification {
    fn from(message: FedNotify) -> Self {
        Self {
            attributes: message.attributes,
            deliver_insecure: message.deliver_insecure,
            keys: message.keys,
            routing: message.routing,
        }
    }
}

/// Receives every notification the router delivers.
pub trait NotifyListener: Send + Sync {
    /// `keys` are the connection-wide notification keys of the producer,
    /// in addition to `notification.keys`.
    fn notify_received(&self, notification: &Notification, keys: &Keys);
}

/// Ordered copy-on-write listener list. Firing iterates a snapshot, so
/// listeners may add or remove themselves during a fan-out.
pub(crate) struct NotifyListeners {
    snapshot: ArcSwap<Vec<Arc<dyn NotifyListener>>>,
    writer: Mutex<()>,
}

impl NotifyListeners {
    pub(crate) fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Vec::new()),
            writer: Mutex::new(()),
        }
    }

    pub(crate) fn add(&self, listener: Arc<dyn NotifyListener>) {
        let _writer = self.writer.lock();
        let mut listeners = Vec::clone(&self.snapshot.load());
        listeners.push(listener);
        let count = listeners.len();
        self.snapshot.store(Arc::new(listeners));

        debug!(
            event = events::DELIVERY_LISTENER_ADD,
            component = COMPONENT,
            listener_count = count,
            "notify listener added"
        );
    }

    /// Removes `listener`, compared by identity. Removing an absent
    /// listener does nothing.
    pub(crate) fn remove(&self, listener: &Arc<dyn NotifyListener>) {
        let _writer = self.writer.lock();
        let current = self.snapshot.load();
        if !current.iter().any(|l| same_listener(l, listener)) {
            return;
        }
        let listeners: Vec<_> = current
            .iter()
            .filter(|l| !same_listener(l, listener))
            .cloned()
            .collect();
        let count = listeners.len();
        self.snapshot.store(Arc::new(listeners));

        debug!(
            event = events::DELIVERY_LISTENER_REMOVE,
            component = COMPONENT,
            listener_count = count,
            "notify listener removed"
        );
    }

    pub(crate) fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    pub(crate) fn fire(&self, notification: &Notification, keys: &Keys) {
        let listeners = self.snapshot.load_full();
        for listener in listeners.iter() {
            listener.notify_received(notification, keys);
        }
    }
}

fn same_listener(a: &Arc<dyn NotifyListener>, b: &Arc<dyn NotifyListener>) -> bool {
    // Compare data pointers only; vtable pointers may differ across codegen units.
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
