//! Federation protocol message payloads.

use super::Message;
use crate::security::Keys;
use crate::subscription::{Attributes, Node};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
pub struct FedConnRqst {
    pub xid: u32,
    pub version_major: i32,
    pub version_minor: i32,
    pub server_domain: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FedConnRply {
    pub xid: u32,
    pub server_domain: String,
    pub request: Option<Arc<Message>>,
}

/// Replaces the filter the sender wants applied to notifications it pulls.
#[derive(Clone, Debug, PartialEq)]
pub struct FedSubReplace {
    pub xid: u32,
    pub incoming_filter: Node,
}

/// A notification forwarded between routers. `routing` lists the server
/// domains it has already passed through, most recent first.
#[derive(Clone, Debug, PartialEq)]
pub struct FedNotify {
    pub attributes: Attributes,
    pub deliver_insecure: bool,
    pub keys: Keys,
    pub routing: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Ack {
    pub xid: u32,
    pub request: Option<Arc<Message>>,
}
