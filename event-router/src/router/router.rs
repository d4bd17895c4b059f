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


//! The client-facing router.
//!
//! [`Router`] is the [`SessionHandler`] for client sessions. It owns the
//! per-session [`Connection`]s, applies admission limits, and runs the
//! delivery core that matches each notification against every open
//! connection before handing it to the registered [`NotifyListener`]s.

use super::{
    Connection, ConnectionOptions, ConnectionState, InvalidOption, Notification, NotifyListener,
    NotifyListeners, Subscription, SubscriptionIdGenerator, VENDOR_IDENTIFICATION,
};
use crate::messages::{
    disconnect, nack, ConnRply, ConnRqst, DisconnRply, Message, NotifyDeliver, SecRply, SecRqst,
    SubAddRqst, SubDelRqst, SubModRqst, SubRply, CLIENT_VERSION_MAJOR, CLIENT_VERSION_MINOR,
};
use crate::observability::{events, fields};
use crate::security::{Keys, Role};
use crate::subscription::{ParseError, Value};
use crate::transport::{Session, SessionHandler, SessionId};
use parking_lot::{RwLock, RwLockWriteGuard};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

const COMPONENT: &str = "router";
const CONNECTION_KEY: &str = "connection";

/// A client broke the protocol. The session is disconnected with
/// `PROTOCOL_VIOLATION` and this text.
struct ProtocolViolation(String);

impl ProtocolViolation {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub struct Router {
    options: ConnectionOptions,
    vendor_identification: String,
    subscription_ids: SubscriptionIdGenerator,
    sessions: RwLock<HashMap<SessionId, Arc<dyn Session>>>,
    listeners: NotifyListeners,
    closing: AtomicBool,
}

impl Router {
    /// Creates a router whose connections default to `options`.
    pub fn new(options: ConnectionOptions) -> Result<Self, InvalidOption> {
        options.validate()?;

        Ok(Self {
            options,
            vendor_identification: format!("event-router {}", env!("CARGO_PKG_VERSION")),
            subscription_ids: SubscriptionIdGenerator::new(),
            sessions: RwLock::new(HashMap::new()),
            listeners: NotifyListeners::new(),
            closing: AtomicBool::new(false),
        })
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Number of client sessions currently open, connected or not.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn add_notify_listener(&self, listener: Arc<dyn NotifyListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_notify_listener(&self, listener: &Arc<dyn NotifyListener>) {
        self.listeners.remove(listener);
    }

    /// Delivers a notification from an outside producer, such as a
    /// federation link. No connection-wide keys apply.
    pub fn inject_notify(&self, notification: Notification) {
        self.deliver(&notification, &Keys::new());
    }

    /// Disconnects every client with `SHUTDOWN`. Idempotent.
    pub fn close(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }

        let sessions: Vec<_> = self.sessions.read().values().cloned().collect();

        info!(
            event = events::ROUTER_SHUTDOWN,
            component = COMPONENT,
            session_count = sessions.len(),
            "router closing"
        );

        for session in sessions {
            if let Some(connection) = connection_for(&session) {
                let mut state = connection.write();
                if state.is_open() {
                    send(&session, Message::disconn(disconnect::SHUTDOWN, ""));
                    state.close();
                }
            }
            session.close();
        }
    }

    fn deliver(&self, notification: &Notification, global_keys: &Keys) {
        let sessions: Vec<_> = self.sessions.read().values().cloned().collect();

        for session in sessions {
            let Some(connection) = connection_for(&session) else {
                continue;
            };
            let state = connection.read();
            if !state.is_open() {
                continue;
            }

            let matches = state.match_subscriptions(
                &notification.attributes,
                global_keys,
                &notification.keys,
                notification.deliver_insecure,
            );

            if matches.matched() {
                debug!(
                    component = COMPONENT,
                    session_id = %session.id(),
                    secure = %fields::format_subscription_ids(&matches.secure),
                    insecure = %fields::format_subscription_ids(&matches.insecure),
                    "delivering notification"
                );
                send(
                    &session,
                    Message::NotifyDeliver(NotifyDeliver {
                        attributes: notification.attributes.clone(),
                        secure_matches: matches.secure,
                        insecure_matches: matches.insecure,
                    }),
                );
            }
        }

        if self.listeners.len() > 0 {
            self.listeners.fire(notification, global_keys);
        }
    }

    fn dispatch(&self, session: &Arc<dyn Session>, message: Message) -> Result<(), ProtocolViolation> {
        match message {
            Message::NotifyEmit(emit) => {
                let global_keys = {
                    let connection = connection_for(session)
                        .ok_or_else(|| ProtocolViolation::new("No connection established for session"))?;
                    let state = connection.read();
                    if !state.is_open() {
                        return Err(ProtocolViolation::new("Connection is closed"));
                    }
                    state.notification_keys.clone()
                };
                let mut notification = Notification::from(emit);
                notification.keys.hash_private_keys_for_role(Role::Producer);
                self.deliver(&notification, &global_keys);
                Ok(())
            }
            Message::UNotify(unotify) => {
                let mut notification = Notification::from(unotify);
                notification.keys.hash_private_keys_for_role(Role::Producer);
                self.deliver(&notification, &Keys::new());
                Ok(())
            }
            Message::TestConn => {
                send(session, Message::ConfConn);
                Ok(())
            }
            Message::QuenchAddRqst(_) | Message::QuenchModRqst(_) | Message::QuenchDelRqst(_) => {
                debug!(
                    component = COMPONENT,
                    session_id = %session.id(),
                    "rejecting quench request"
                );
                send(session, Message::nack(&message, nack::NOT_IMPL, "Quench not supported"));
                Ok(())
            }
            Message::ConnRqst(ref rqst) => self.handle_conn_rqst(session, &message, rqst),
            Message::DisconnRqst(_) => self.handle_disconn_rqst(session, &message),
            Message::SecRqst(ref rqst) => self.handle_sec_rqst(session, &message, rqst),
            Message::SubAddRqst(ref rqst) => self.handle_sub_add_rqst(session, &message, rqst),
            Message::SubModRqst(ref rqst) => self.handle_sub_mod_rqst(session, &message, rqst),
            Message::SubDelRqst(ref rqst) => self.handle_sub_del_rqst(session, &message, rqst),
            Message::Error(error) => Err(ProtocolViolation(error.error)),
            other => Err(ProtocolViolation(format!("Unexpected {}", other.name()))),
        }
    }

    fn handle_conn_rqst(
        &self,
        session: &Arc<dyn Session>,
        message: &Message,
        rqst: &ConnRqst,
    ) -> Result<(), ProtocolViolation> {
        if connection_for(session).is_some() {
            return Err(ProtocolViolation::new("Already connected"));
        }

        if rqst.version_major != CLIENT_VERSION_MAJOR || rqst.version_minor > CLIENT_VERSION_MINOR {
            send(
                session,
                Message::nack(
                    message,
                    nack::PROT_INCOMPAT,
                    format!(
                        "Max supported protocol version is {CLIENT_VERSION_MAJOR}.{CLIENT_VERSION_MINOR}"
                    ),
                ),
            );
            return Ok(());
        }

        let (options, mut accepted) = self.options.negotiate(&rqst.options);
        let connection = Arc::new(Connection::new(
            options,
            rqst.subscription_keys.clone(),
            rqst.notification_keys.clone(),
        ));

        let state = connection.write();
        if state.connection_keys_full(&state.notification_keys, &state.subscription_keys) {
            nack_limit(session, message, "Too many keys");
            return Ok(());
        }

        accepted.insert(
            VENDOR_IDENTIFICATION.to_string(),
            Value::from(self.vendor_identification.as_str()),
        );
        session.attributes().insert(CONNECTION_KEY, connection.clone());
        send(
            session,
            Message::ConnRply(ConnRply {
                xid: rqst.xid,
                options: accepted,
                request: None,
            }),
        );
        drop(state);

        info!(
            event = events::CLIENT_CONNECTED,
            component = COMPONENT,
            session_id = %session.id(),
            remote = %session.remote_address(),
            "client connected"
        );
        Ok(())
    }

    fn handle_disconn_rqst(
        &self,
        session: &Arc<dyn Session>,
        message: &Message,
    ) -> Result<(), ProtocolViolation> {
        let connection = require_connection(session)?;
        let mut state = open_for_write(&connection)?;

        state.close();
        send(
            session,
            Message::DisconnRply(DisconnRply {
                xid: message.xid().unwrap_or_default(),
                request: None,
            }),
        );
        session.close();
        Ok(())
    }

    fn handle_sec_rqst(
        &self,
        session: &Arc<dyn Session>,
        message: &Message,
        rqst: &SecRqst,
    ) -> Result<(), ProtocolViolation> {
        let connection = require_connection(session)?;
        let mut state = open_for_write(&connection)?;

        let new_notification_keys = state.notification_keys.delta(
            &hashed(&rqst.add_notification_keys, Role::Producer),
            &hashed(&rqst.del_notification_keys, Role::Producer),
        );
        let new_subscription_keys = state.subscription_keys.delta(
            &hashed(&rqst.add_subscription_keys, Role::Consumer),
            &hashed(&rqst.del_subscription_keys, Role::Consumer),
        );

        if state.connection_keys_full(&new_notification_keys, &new_subscription_keys) {
            nack_limit(session, message, "Too many keys");
        } else {
            state.notification_keys = new_notification_keys;
            state.subscription_keys = new_subscription_keys;
            send(
                session,
                Message::SecRply(SecRply {
                    xid: rqst.xid,
                    request: None,
                }),
            );
        }
        Ok(())
    }

    fn handle_sub_add_rqst(
        &self,
        session: &Arc<dyn Session>,
        message: &Message,
        rqst: &SubAddRqst,
    ) -> Result<(), ProtocolViolation> {
        let connection = require_connection(session)?;
        let mut state = open_for_write(&connection)?;

        if state.subscriptions_full() {
            nack_limit(session, message, "Too many subscriptions");
        } else if state.subscription_too_long(&rqst.subscription_expr) {
            nack_limit(session, message, "Subscription too long");
        } else if state.subscription_keys_full(&rqst.keys) {
            nack_limit(session, message, "Too many keys");
        } else {
            match Subscription::new(
                self.subscription_ids.next_id(),
                &rqst.subscription_expr,
                rqst.keys.clone(),
                rqst.accept_insecure,
            ) {
                Ok(subscription) => {
                    let subscription_id = subscription.id;
                    state.add_subscription(subscription);
                    send(session, sub_rply(rqst.xid, subscription_id));

                    debug!(
                        event = events::SUBSCRIPTION_ADD,
                        component = COMPONENT,
                        session_id = %session.id(),
                        subscription_id,
                        "subscription added"
                    );
                }
                Err(err) => nack_parse_error(session, message, &rqst.subscription_expr, &err),
            }
        }
        Ok(())
    }

    fn handle_sub_mod_rqst(
        &self,
        session: &Arc<dyn Session>,
        message: &Message,
        rqst: &SubModRqst,
    ) -> Result<(), ProtocolViolation> {
        let connection = require_connection(session)?;
        let mut state = open_for_write(&connection)?;

        let new_keys = match state.subscription_for(rqst.subscription_id) {
            Ok(subscription) => subscription.keys.delta(
                &hashed(&rqst.add_keys, Role::Consumer),
                &hashed(&rqst.del_keys, Role::Consumer),
            ),
            Err(err) => {
                nack_no_subscription(session, message, &err.to_string());
                return Ok(());
            }
        };

        if state.subscription_keys_full(&new_keys) {
            nack_limit(session, message, "Too many keys");
            return Ok(());
        }
        if state.subscription_too_long(&rqst.subscription_expr) {
            nack_limit(session, message, "Subscription too long");
            return Ok(());
        }

        let Ok(subscription) = state.subscription_for_mut(rqst.subscription_id) else {
            return Ok(());
        };
        if !rqst.subscription_expr.is_empty() {
            if let Err(err) = subscription.update_expression(&rqst.subscription_expr) {
                nack_parse_error(session, message, &rqst.subscription_expr, &err);
                return Ok(());
            }
        }
        subscription.keys = new_keys;
        subscription.accept_insecure = rqst.accept_insecure;
        send(session, sub_rply(rqst.xid, rqst.subscription_id));

        debug!(
            event = events::SUBSCRIPTION_MODIFY,
            component = COMPONENT,
            session_id = %session.id(),
            subscription_id = rqst.subscription_id,
            "subscription modified"
        );
        Ok(())
    }

    fn handle_sub_del_rqst(
        &self,
        session: &Arc<dyn Session>,
        message: &Message,
        rqst: &SubDelRqst,
    ) -> Result<(), ProtocolViolation> {
        let connection = require_connection(session)?;
        let mut state = open_for_write(&connection)?;

        if state.remove_subscription(rqst.subscription_id).is_some() {
            send(session, sub_rply(rqst.xid, rqst.subscription_id));

            debug!(
                event = events::SUBSCRIPTION_DELETE,
                component = COMPONENT,
                session_id = %session.id(),
                subscription_id = rqst.subscription_id,
                "subscription deleted"
            );
        } else {
            nack_no_subscription(session, message, "Invalid subscription ID");
        }
        Ok(())
    }

    fn disconnect_protocol_violation(&self, session: &Arc<dyn Session>, reason: &str) {
        warn!(
            event = events::CLIENT_PROTOCOL_VIOLATION,
            component = COMPONENT,
            session_id = %session.id(),
            remote = %session.remote_address(),
            reason,
            "disconnecting client after protocol violation"
        );

        if let Some(connection) = connection_for(session) {
            connection.write().close();
        }

        send(
            session,
            Message::disconn(disconnect::PROTOCOL_VIOLATION, reason),
        );
        session.close();
    }
}

impl SessionHandler for Router {
    fn session_opened(&self, session: &Arc<dyn Session>) {
        if self.is_closing() {
            session.close();
            return;
        }
        self.sessions.write().insert(session.id(), session.clone());
    }

    fn message_received(&self, session: &Arc<dyn Session>, message: Message) {
        if self.is_closing() {
            return;
        }
        if connection_for(session).is_some_and(|connection| !connection.read().is_open()) {
            return;
        }

        if let Err(ProtocolViolation(reason)) = self.dispatch(session, message) {
            self.disconnect_protocol_violation(session, &reason);
        }
    }

    fn session_closed(&self, session: &Arc<dyn Session>) {
        self.sessions.write().remove(&session.id());

        if let Some(connection) = connection_for(session) {
            connection.write().close();
        }
        session.attributes().remove(CONNECTION_KEY);

        info!(
            event = events::CLIENT_DISCONNECTED,
            component = COMPONENT,
            session_id = %session.id(),
            remote = %session.remote_address(),
            "client session closed"
        );
    }
}

fn connection_for(session: &Arc<dyn Session>) -> Option<Arc<Connection>> {
    session.attributes().get::<Connection>(CONNECTION_KEY)
}

fn require_connection(session: &Arc<dyn Session>) -> Result<Arc<Connection>, ProtocolViolation> {
    connection_for(session).ok_or_else(|| ProtocolViolation::new("No connection established for session"))
}

fn open_for_write(connection: &Connection) -> Result<RwLockWriteGuard<'_, ConnectionState>, ProtocolViolation> {
    let state = connection.write();
    if state.is_open() {
        Ok(state)
    } else {
        Err(ProtocolViolation::new("Connection is closed"))
    }
}

fn hashed(keys: &Keys, role: Role) -> Keys {
    let mut keys = keys.clone();
    keys.hash_private_keys_for_role(role);
    keys
}

fn sub_rply(xid: u32, subscription_id: u64) -> Message {
    Message::SubRply(SubRply {
        xid,
        subscription_id,
        request: None,
    })
}

fn send(session: &Arc<dyn Session>, message: Message) {
    if let Err(err) = session.send(message) {
        debug!(
            event = events::DELIVERY_SEND_FAILED,
            component = COMPONENT,
            session_id = %session.id(),
            err = %err,
            "send to client failed"
        );
    }
}

fn nack_limit(session: &Arc<dyn Session>, request: &Message, text: &str) {
    debug!(
        event = events::CLIENT_REQUEST_REJECTED,
        component = COMPONENT,
        session_id = %session.id(),
        msg_type = request.name(),
        reason = fields::REASON_LIMIT_EXCEEDED,
        "{text}"
    );
    send(session, Message::nack(request, nack::IMPL_LIMIT, text));
}

fn nack_no_subscription(session: &Arc<dyn Session>, request: &Message, text: &str) {
    debug!(
        event = events::CLIENT_REQUEST_REJECTED,
        component = COMPONENT,
        session_id = %session.id(),
        msg_type = request.name(),
        reason = fields::REASON_NO_SUCH_SUBSCRIPTION,
        "{text}"
    );
    send(session, Message::nack(request, nack::NO_SUCH_SUB, text));
}

fn nack_parse_error(session: &Arc<dyn Session>, request: &Message, expr: &str, err: &ParseError) {
    let code = if err.is_trivial() {
        nack::EXP_IS_TRIVIAL
    } else {
        nack::PARSE_ERROR
    };

    debug!(
        event = events::CLIENT_REQUEST_REJECTED,
        component = COMPONENT,
        session_id = %session.id(),
        msg_type = request.name(),
        expr,
        err = %err,
        "subscription rejected"
    );
    send(session, Message::nack(request, code, err.to_string()));
}
