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


//! # event-router
//!
//! `event-router` is a content-based publish/subscribe router. Clients
//! subscribe with boolean filter expressions over notification attributes
//! and receive every notification whose attributes make their filter true.
//! Routers can federate, exchanging notifications across administrative
//! domains under per-remote import/export policies.
//!
//! The crate is transport-agnostic: a transport turns bytes into
//! [`messages::Message`]s and drives a [`transport::SessionHandler`] per
//! session. [`router::Router`] is the handler for client sessions; the
//! [`federation`] types handle router-to-router sessions.
//!
//! ## Quick start
//!
//! ```
//! use std::sync::Arc;
//! use event_router::messages::{
//!     ConnRqst, Message, NotifyEmit, SubAddRqst, CLIENT_VERSION_MAJOR, CLIENT_VERSION_MINOR,
//! };
//! use event_router::router::{ConnectionOptions, Router};
//! use event_router::security::Keys;
//! use event_router::subscription::attributes;
//! use event_router::transport::{Session, SessionHandler};
//!
//! # mod mock_session {
//! #     use event_router::messages::Message;
//! #     use event_router::transport::*;
//! #     use std::sync::Mutex;
//! #     use std::time::Duration;
//! #
//! #     pub struct MockSession {
//! #         pub id: SessionId,
//! #         pub address: RemoteAddress,
//! #         pub attributes: SessionAttributes,
//! #         pub sent: Mutex<Vec<Message>>,
//! #     }
//! #
//! #     impl Session for MockSession {
//! #         fn id(&self) -> SessionId { self.id }
//! #         fn send(&self, message: Message) -> Result<(), SessionError> {
//! #             self.sent.lock().unwrap().push(message);
//! #             Ok(())
//! #         }
//! #         fn close(&self) {}
//! #         fn is_connected(&self) -> bool { true }
//! #         fn set_idle_timeout(&self, _timeout: Option<Duration>) {}
//! #         fn remote_address(&self) -> &RemoteAddress { &self.address }
//! #         fn attributes(&self) -> &SessionAttributes { &self.attributes }
//! #     }
//! # }
//! # use event_router::transport::{RemoteAddress, SessionAttributes, SessionId};
//! let router = Router::new(ConnectionOptions::default()).unwrap();
//!
//! let client = Arc::new(mock_session::MockSession {
//!     id: SessionId::new(),
//!     address: RemoteAddress::new("localhost", 40000),
//!     attributes: SessionAttributes::new(),
//!     sent: Default::default(),
//! });
//! let session: Arc<dyn Session> = client.clone();
//!
//! router.session_opened(&session);
//! router.message_received(&session, Message::ConnRqst(ConnRqst {
//!     xid: 1,
//!     version_major: CLIENT_VERSION_MAJOR,
//!     version_minor: CLIENT_VERSION_MINOR,
//!     options: Default::default(),
//!     notification_keys: Keys::new(),
//!     subscription_keys: Keys::new(),
//! }));
//! router.message_received(&session, Message::SubAddRqst(SubAddRqst {
//!     xid: 2,
//!     subscription_expr: "Temperature > 30".to_string(),
//!     accept_insecure: true,
//!     keys: Keys::new(),
//! }));
//! router.message_received(&session, Message::NotifyEmit(NotifyEmit {
//!     attributes: attributes([("Temperature", 35)]),
//!     deliver_insecure: true,
//!     keys: Keys::new(),
//! }));
//!
//! let sent = client.sent.lock().unwrap();
//! assert!(matches!(sent[0], Message::ConnRply(_)));
//! assert!(matches!(sent[1], Message::SubRply(_)));
//! assert!(matches!(&sent[2], Message::NotifyDeliver(ntfn) if ntfn.insecure_matches.len() == 1));
//! ```
//!
//! ## Internal architecture map
//!
//! - [`subscription`]: filter language lexer, parser, constant folding and
//!   three-valued evaluation.
//! - [`security`]: key schemes and key-set matching.
//! - [`messages`]: the closed protocol message set and reply codes.
//! - [`router`]: client connections, subscriptions and the delivery core.
//! - [`transport`]: the session seam plus request-tracking and liveness
//!   filters.
//! - [`federation`]: links, acceptor, connectors and their configuration.
//! - [`runtime`]: the owned timer/task scheduler.
//!
//! ## Observability model
//!
//! Logging goes through `tracing`. Events carry a stable `event` name, the
//! emitting `component` and, where known, `session_id`, `remote`,
//! `remote_domain` and `reason` fields. The crate never installs a
//! subscriber; binaries and tests do.

pub mod federation;
pub mod messages;
mod observability;
pub mod router;
pub mod runtime;
pub mod security;
pub mod subscription;
#[cfg(test)]
mod test_support;
pub mod transport;
