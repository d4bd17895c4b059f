//! Client protocol message payloads.

use super::Message;
use crate::security::Keys;
use crate::subscription::{Attributes, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Connection options as exchanged in `ConnRqst` / `ConnRply`.
pub type OptionMap = BTreeMap<String, Value>;

#[derive(Clone, Debug, PartialEq)]
pub struct ConnRqst {
    pub xid: u32,
    pub version_major: i32,
    pub version_minor: i32,
    pub options: OptionMap,
    pub notification_keys: Keys,
    pub subscription_keys: Keys,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConnRply {
    pub xid: u32,
    pub options: OptionMap,
    pub request: Option<Arc<Message>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DisconnRqst {
    pub xid: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DisconnRply {
    pub xid: u32,
    pub request: Option<Arc<Message>>,
}

/// Server-initiated disconnect.
#[derive(Clone, Debug, PartialEq)]
pub struct Disconn {
    pub reason: i32,
    pub args: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SecRqst {
    pub xid: u32,
    pub add_notification_keys: Keys,
    pub del_notification_keys: Keys,
    pub add_subscription_keys: Keys,
    pub del_subscription_keys: Keys,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SecRply {
    pub xid: u32,
    pub request: Option<Arc<Message>>,
}

/// Publish from a connected client.
#[derive(Clone, Debug, PartialEq)]
pub struct NotifyEmit {
    pub attributes: Attributes,
    pub deliver_insecure: bool,
    pub keys: Keys,
}

/// Publish from an unconnected client.
#[derive(Clone, Debug, PartialEq)]
pub struct UNotify {
    pub client_major_version: i32,
    pub client_minor_version: i32,
    pub attributes: Attributes,
    pub deliver_insecure: bool,
    pub keys: Keys,
}

/// Delivery of one notification to a client, listing the subscriptions it
/// matched.
#[derive(Clone, Debug, PartialEq)]
pub struct NotifyDeliver {
    pub attributes: Attributes,
    pub secure_matches: Vec<u64>,
    pub insecure_matches: Vec<u64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubAddRqst {
    pub xid: u32,
    pub subscription_expr: String,
    pub accept_insecure: bool,
    pub keys: Keys,
}

/// An empty `subscription_expr` leaves the current expression in place.
#[derive(Clone, Debug, PartialEq)]
pub struct SubModRqst {
    pub xid: u32,
    pub subscription_id: u64,
    pub subscription_expr: String,
    pub accept_insecure: bool,
    pub add_keys: Keys,
    pub del_keys: Keys,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubDelRqst {
    pub xid: u32,
    pub subscription_id: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubRply {
    pub xid: u32,
    pub subscription_id: u64,
    pub request: Option<Arc<Message>>,
}

/// Negative reply to any request.
#[derive(Clone, Debug, PartialEq)]
pub struct Nack {
    pub xid: u32,
    pub error: i32,
    pub message: String,
    pub request: Option<Arc<Message>>,
}

/// Quench requests are recognised but not supported.
#[derive(Clone, Debug, PartialEq)]
pub struct QuenchRqst {
    pub xid: u32,
}
