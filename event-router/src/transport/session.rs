/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

use crate::messages::Message;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Process-unique identity of a transport session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where the other end of a session lives. Federation class resolution
/// matches host patterns against every populated field.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RemoteAddress {
    pub host_name: String,
    pub resolved_host_name: Option<String>,
    pub ip: Option<IpAddr>,
    pub port: u16,
}

impl RemoteAddress {
    pub fn new(host_name: impl Into<String>, port: u16) -> Self {
        Self {
            host_name: host_name.into(),
            resolved_host_name: None,
            ip: None,
            port,
        }
    }

    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip = Some(ip);
        self
    }

    pub fn with_resolved_host_name(mut self, name: impl Into<String>) -> Self {
        self.resolved_host_name = Some(name.into());
        self
    }
}

impl Display for RemoteAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host_name, self.port)
    }
}

/// Failure to hand a message to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The session is closed or closing.
    Closed(SessionId),
    Transport { session_id: SessionId, message: String },
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Closed(session_id) => write!(f, "session {session_id} is closed"),
            SessionError::Transport {
                session_id,
                message,
            } => write!(f, "transport error on session {session_id}: {message}"),
        }
    }
}

impl std::error::Error for SessionError {}

/// One transport session as seen by protocol code.
///
/// Implementations must deliver handler callbacks for a session one at a
/// time, in arrival order. `send` queues and never blocks on I/O.
pub trait Session: Send + Sync {
    fn id(&self) -> SessionId;

    fn send(&self, message: Message) -> Result<(), SessionError>;

    /// Closes the session once already queued messages are flushed. The
    /// handler's `session_closed` runs exactly once afterwards.
    fn close(&self);

    fn is_connected(&self) -> bool;

    /// Read-idle period after which the handler's `session_idle` runs.
    /// `None` disables idle notifications.
    fn set_idle_timeout(&self, timeout: Option<Duration>);

    fn remote_address(&self) -> &RemoteAddress;

    fn attributes(&self) -> &SessionAttributes;
}

/// Receiver of session events.
pub trait SessionHandler: Send + Sync {
    fn session_opened(&self, _session: &Arc<dyn Session>) {}

    fn message_received(&self, session: &Arc<dyn Session>, message: Message);

    fn session_idle(&self, _session: &Arc<dyn Session>) {}

    fn session_closed(&self, session: &Arc<dyn Session>);
}

/// Typed per-session attribute slots.
#[derive(Default)]
pub struct SessionAttributes {
    values: Mutex<HashMap<&'static str, Arc<dyn Any + Send + Sync>>>,
}

impl SessionAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Any + Send + Sync>(&self, key: &'static str, value: Arc<T>) {
        self.values.lock().insert(key, value);
    }

    /// The value under `key`, if present and of type `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &'static str) -> Option<Arc<T>> {
        let value = self.values.lock().get(key).cloned()?;
        value.downcast::<T>().ok()
    }

    pub fn remove(&self, key: &'static str) {
        self.values.lock().remove(key);
    }

    pub fn set_flag(&self, key: &'static str) {
        self.insert(key, Arc::new(()));
    }

    pub fn contains(&self, key: &'static str) -> bool {
        self.values.lock().contains_key(key)
    }
}

impl Debug for SessionAttributes {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let values = self.values.lock();
        let mut keys: Vec<_> = values.keys().collect();
        keys.sort();
        f.debug_struct("SessionAttributes").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_are_typed() {
        let attributes = SessionAttributes::new();
        attributes.insert("count", Arc::new(3u32));

        assert_eq!(attributes.get::<u32>("count").as_deref(), Some(&3));
        assert!(attributes.get::<String>("count").is_none());
        assert!(attributes.get::<u32>("missing").is_none());
    }

    #[test]
    fn flags_can_be_set_and_removed() {
        let attributes = SessionAttributes::new();

        attributes.set_flag("closing");
        assert!(attributes.contains("closing"));

        attributes.remove("closing");
        assert!(!attributes.contains("closing"));
    }

    #[test]
    fn remote_address_display() {
        let address = RemoteAddress::new("router.example.com", 2916)
            .with_ip("10.0.0.1".parse().unwrap());

        assert_eq!(address.to_string(), "router.example.com:2916");
    }
}
