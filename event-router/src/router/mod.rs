//! Client connections, subscriptions and the local delivery core.
//!
//! ```
//! use std::sync::Arc;
//! use event_router::router::{ConnectionOptions, Notification, Router};
//! use event_router::security::Keys;
//! use event_router::subscription::attributes;
//!
//! let router = Arc::new(Router::new(ConnectionOptions::default()).unwrap());
//!
//! // Notifications injected from outside reach every matching client and
//! // every registered listener.
//! router.inject_notify(Notification {
//!     attributes: attributes([("greeting", "hello")]),
//!     deliver_insecure: true,
//!     keys: Keys::new(),
//!     routing: Vec::new(),
//! });
//! ```

mod connection;
mod delivery;
mod options;
#[allow(clippy::module_inception)]
mod router;
mod subscription;
mod subscription_match;

pub use connection::{Connection, ConnectionState, InvalidSubscription};
pub(crate) use delivery::NotifyListeners;
pub use delivery::{Notification, NotifyListener};
pub use options::{
    ConnectionOptions, InvalidOption, OptionRange, CONNECTION_MAX_KEYS, OPTION_RANGES,
    SUBSCRIPTION_MAX_COUNT, SUBSCRIPTION_MAX_KEYS, SUBSCRIPTION_MAX_LENGTH, VENDOR_IDENTIFICATION,
};
pub use router::Router;
pub use subscription::{Subscription, SubscriptionIdGenerator};
pub use subscription_match::SubscriptionMatch;
