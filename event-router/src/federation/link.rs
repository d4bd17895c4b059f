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


//! One live federation link.
//!
//! A [`Link`] exists for each federation session that completed its
//! handshake, whichever side dialed. It subscribes the remote to this
//! router's incoming filter, pushes locally delivered notifications that the
//! class and the remote's pull filter allow, and re-injects notifications it
//! pulls from the remote so that they reach local clients and other links.
//!
//! Loops are prevented by the routing list carried in every `FedNotify`: a
//! link never pushes to a domain already in the list and never pulls a
//! notification that already passed through this router.

use super::{same_domain, FederationClass};
use crate::messages::{
    disconnect, Ack, FedNotify, FedSubReplace, Message, XidGenerator,
};
use crate::observability::{events, fields};
use crate::router::{Notification, NotifyListener, Router};
use crate::security::Keys;
use crate::subscription::{union, Attributes, Node, CONST_FALSE};
use crate::transport::Session;
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

const COMPONENT: &str = "link";
const LINK_CLOSED_KEY: &str = "link-closed";

pub struct Link {
    router: Arc<Router>,
    session: Arc<dyn Session>,
    federation_class: Arc<FederationClass>,
    server_domain: String,
    remote_server_domain: String,
    remote_host_name: String,
    remote_pull_filter: ArcSwap<Node>,
    xids: Arc<XidGenerator>,
    subscribed: AtomicBool,
    closed: AtomicBool,
    this: Weak<Link>,
}

impl Link {
    /// Creates a link over an established session, sends the initial
    /// `FedSubReplace` and registers for outgoing notifications as the
    /// class allows.
    pub fn new(
        router: Arc<Router>,
        session: Arc<dyn Session>,
        federation_class: Arc<FederationClass>,
        server_domain: impl Into<String>,
        remote_server_domain: impl Into<String>,
        remote_host_name: impl Into<String>,
        xids: Arc<XidGenerator>,
    ) -> Arc<Self> {
        let link = Arc::new_cyclic(|this| Self {
            router,
            session,
            federation_class,
            server_domain: server_domain.into(),
            remote_server_domain: remote_server_domain.into(),
            remote_host_name: remote_host_name.into(),
            remote_pull_filter: ArcSwap::from_pointee(CONST_FALSE),
            xids,
            subscribed: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            this: this.clone(),
        });

        link.subscribe();

        if link.federation_class.outgoing_filter != CONST_FALSE {
            link.router.add_notify_listener(link.clone());
        }

        link
    }

    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    pub fn server_domain(&self) -> &str {
        &self.server_domain
    }

    pub fn remote_server_domain(&self) -> &str {
        &self.remote_server_domain
    }

    pub fn remote_host_name(&self) -> &str {
        &self.remote_host_name
    }

    pub fn federation_class(&self) -> &Arc<FederationClass> {
        &self.federation_class
    }

    /// The filter the remote asked us to apply before pushing to it.
    pub fn remote_pull_filter(&self) -> Arc<Node> {
        self.remote_pull_filter.load_full()
    }

    /// True once the remote accepted our subscription, or immediately when
    /// there is nothing to subscribe to.
    pub fn is_live(&self) -> bool {
        self.federation_class.incoming_filter == CONST_FALSE || self.subscribed.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// True when the session was closed by this link rather than the remote.
    pub fn initiated_session_close(&self) -> bool {
        self.session.attributes().contains(LINK_CLOSED_KEY)
    }

    /// Disconnects the remote with `SHUTDOWN`.
    pub fn close(&self) {
        self.close_with(disconnect::SHUTDOWN, "");
    }

    /// Idempotent. Negative `reason`s are internal: the session is closed
    /// without sending `Disconn`.
    fn close_with(&self, reason: i32, text: &str) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(this) = self.this.upgrade() {
            let listener: Arc<dyn NotifyListener> = this;
            self.router.remove_notify_listener(&listener);
        }

        if self.session.is_connected() {
            self.session.attributes().set_flag(LINK_CLOSED_KEY);

            if reason >= 0 {
                self.send(Message::disconn(reason, text));
            }
            self.session.close();
        }

        info!(
            event = events::LINK_CLOSED,
            component = COMPONENT,
            session_id = %self.session.id(),
            remote_domain = %self.remote_server_domain,
            reason,
            "federation link closed"
        );
    }

    fn subscribe(&self) {
        if self.federation_class.incoming_filter == CONST_FALSE {
            return;
        }

        self.send(Message::FedSubReplace(FedSubReplace {
            xid: self.xids.next_xid(),
            incoming_filter: self.federation_class.incoming_filter.clone(),
        }));
    }

    /// Handles a message from the remote, or one synthesized by the
    /// session filters. Ignored once the link is closed.
    pub fn handle_message(&self, message: Message) {
        if self.is_closed() {
            return;
        }

        match message {
            Message::FedSubReplace(replace) => self.handle_fed_sub_replace(replace),
            Message::FedNotify(notify) => self.handle_fed_notify(notify),
            Message::Disconn(_) => self.close_with(disconnect::DISCONN_REQUESTED, ""),
            Message::DropWarn => {
                warn!(
                    event = events::LINK_DROP_WARN,
                    component = COMPONENT,
                    remote_domain = %self.remote_server_domain,
                    "remote federator warned that messages may have been dropped"
                );
            }
            Message::Nack(nack) => {
                warn!(
                    event = events::LINK_CLOSED,
                    component = COMPONENT,
                    remote_domain = %self.remote_server_domain,
                    msg_type = nack.request.as_deref().map_or(fields::NONE, Message::name),
                    err = %nack.message,
                    "remote federator rejected a request, disconnecting"
                );
                self.close_with(disconnect::REQUEST_REJECTED, "");
            }
            Message::Ack(ack) => {
                if matches!(ack.request.as_deref(), Some(Message::FedSubReplace(_))) {
                    self.subscribed.store(true, Ordering::SeqCst);
                    debug!(
                        event = events::LINK_SUBSCRIBED,
                        component = COMPONENT,
                        remote_domain = %self.remote_server_domain,
                        "remote accepted federation subscription"
                    );
                }
            }
            Message::RequestTimeout(timeout) => {
                if matches!(*timeout.request, Message::FedSubReplace(_)) {
                    warn!(
                        event = events::LINK_RESUBSCRIBE,
                        component = COMPONENT,
                        remote_domain = %self.remote_server_domain,
                        "federation subscription request timed out, retrying"
                    );
                    self.subscribe();
                } else {
                    warn!(
                        event = events::REQUEST_TIMEOUT,
                        component = COMPONENT,
                        remote_domain = %self.remote_server_domain,
                        msg_type = timeout.request.name(),
                        "request timeout for a request the link never sends"
                    );
                }
            }
            Message::LivenessFailure => {
                warn!(
                    event = events::LIVENESS_FAILED,
                    component = COMPONENT,
                    remote = %self.remote_host_name,
                    remote_domain = %self.remote_server_domain,
                    "remote federator stopped responding"
                );
                self.close_with(disconnect::FEDERATOR_NOT_RESPONDING, "");
            }
            Message::Error(error) => self.protocol_violation(&error.error),
            other => self.protocol_violation(&format!("Unexpected {}", other.name())),
        }
    }

    fn handle_fed_sub_replace(&self, replace: FedSubReplace) {
        self.remote_pull_filter
            .store(Arc::new(replace.incoming_filter.inline_constants()));
        self.send(Message::Ack(Ack {
            xid: replace.xid,
            request: None,
        }));
    }

    fn handle_fed_notify(&self, notify: FedNotify) {
        if !contains_domain(&notify.routing, &self.remote_server_domain) {
            warn!(
                event = events::LINK_PROTOCOL_VIOLATION,
                component = COMPONENT,
                remote_domain = %self.remote_server_domain,
                routing = %fields::format_routing(&notify.routing),
                "remote did not add its own domain to the routing list"
            );
            self.protocol_violation("Remote server domain was not in FedNotify routing list");
            return;
        }

        let mut notification = Notification::from(notify);
        notification.attributes = union(
            &notification.attributes,
            &self.federation_class.incoming_attributes,
        );

        if self.should_pull(&notification.routing, &notification.attributes) {
            debug!(
                event = events::LINK_PULL_ACCEPTED,
                component = COMPONENT,
                remote_domain = %self.remote_server_domain,
                routing = %fields::format_routing(&notification.routing),
                "pulled federated notification"
            );
            self.router.inject_notify(notification);
        } else if contains_domain(&notification.routing, &self.server_domain) {
            debug!(
                event = events::LINK_PULL_DROPPED,
                component = COMPONENT,
                remote_domain = %self.remote_server_domain,
                routing = %fields::format_routing(&notification.routing),
                reason = fields::REASON_ROUTING_LOOP,
                "dropped federated notification that already passed through this router"
            );
        } else {
            debug!(
                event = events::LINK_PULL_DROPPED,
                component = COMPONENT,
                remote_domain = %self.remote_server_domain,
                routing = %fields::format_routing(&notification.routing),
                "federated notification rejected by incoming filter"
            );
        }
    }

    fn should_push(&self, routing: &[String], attributes: &Attributes) -> bool {
        !contains_domain(routing, &self.remote_server_domain)
            && !contains_domain(routing, &self.server_domain)
            && self.federation_class.outgoing_filter.matches(attributes)
            && self.remote_pull_filter.load().matches(attributes)
    }

    fn should_pull(&self, routing: &[String], attributes: &Attributes) -> bool {
        !contains_domain(routing, &self.server_domain)
            && self.federation_class.incoming_filter.matches(attributes)
    }

    fn protocol_violation(&self, reason: &str) {
        warn!(
            event = events::LINK_PROTOCOL_VIOLATION,
            component = COMPONENT,
            remote = %self.remote_host_name,
            remote_domain = %self.remote_server_domain,
            reason,
            "disconnecting remote federator after protocol violation"
        );
        self.close_with(disconnect::PROTOCOL_VIOLATION, reason);
    }

    fn send(&self, message: Message) {
        if let Err(err) = self.session.send(message) {
            debug!(
                event = events::LINK_SEND_FAILED,
                component = COMPONENT,
                remote_domain = %self.remote_server_domain,
                err = %err,
                "send to remote federator failed"
            );
        }
    }
}

impl NotifyListener for Link {
    fn notify_received(&self, notification: &Notification, keys: &Keys) {
        if self.is_closed() {
            return;
        }

        let attributes = union(&notification.attributes, &self.federation_class.outgoing_attributes);

        if self.should_push(&notification.routing, &attributes) {
            debug!(
                event = events::LINK_PUSH,
                component = COMPONENT,
                remote_domain = %self.remote_server_domain,
                routing = %fields::format_routing(&notification.routing),
                "pushing notification"
            );
            self.send(Message::FedNotify(FedNotify {
                attributes,
                deliver_insecure: notification.deliver_insecure,
                keys: keys.added_to(&notification.keys),
                routing: server_domain_added_to(&self.server_domain, &notification.routing),
            }));
        }
    }
}

fn contains_domain(routing: &[String], domain: &str) -> bool {
    routing.iter().any(|entry| same_domain(entry, domain))
}

fn server_domain_added_to(server_domain: &str, routing: &[String]) -> Vec<String> {
    let mut new_routing = Vec::with_capacity(routing.len() + 1);
    new_routing.push(server_domain.to_string());
    new_routing.extend_from_slice(routing);
    new_routing
}
