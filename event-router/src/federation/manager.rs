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


//! Builds the federation layer from configuration and owns its parts.

use super::{
    Acceptor, Connector, EwafUri, FederationClass, FederationClasses, FederationOptions,
    FederationTimeouts, UriError,
};
use crate::observability::events;
use crate::router::Router;
use crate::runtime::Scheduler;
use crate::subscription::{parse_value_expr, Attributes, InvalidValueExpr, Node, ParseError, CONST_TRUE};
use crate::transport::{FederationTransport, ListenError};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

const COMPONENT: &str = "federation_manager";

#[derive(Debug)]
pub enum FederationConfigError {
    InvalidFilter {
        class_name: String,
        filter: String,
        source: ParseError,
    },
    InvalidAttribute {
        class_name: String,
        attribute: String,
        source: InvalidValueExpr,
    },
    InvalidUri(UriError),
    InvalidHostPattern {
        pattern: String,
        source: regex::Error,
    },
    /// Subscribing to everything a remote router has is not supported.
    SubscribeTrue { class_name: String },
    /// A connect entry whose class can neither import nor export.
    ConnectAllowsNothing { class_name: String },
    InvalidTiming { option: &'static str },
    Listen(ListenError),
}

impl Display for FederationConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FederationConfigError::InvalidFilter {
                class_name,
                filter,
                source,
            } => write!(f, "subscribe/provide[{class_name}]: invalid filter \"{filter}\": {source}"),
            FederationConfigError::InvalidAttribute {
                class_name,
                attribute,
                source,
            } => write!(f, "add-*-attribute[{class_name}][{attribute}]: {source}"),
            FederationConfigError::InvalidUri(err) => write!(f, "{err}"),
            FederationConfigError::InvalidHostPattern { pattern, source } => {
                write!(f, "apply-class: invalid host pattern \"{pattern}\": {source}")
            }
            FederationConfigError::SubscribeTrue { class_name } => write!(
                f,
                "subscribe[{class_name}]: federation with TRUE is not supported"
            ),
            FederationConfigError::ConnectAllowsNothing { class_name } => write!(
                f,
                "connect[{class_name}]: no federation subscribe/provide defined, this connection cannot import or export any notifications"
            ),
            FederationConfigError::InvalidTiming { option } => write!(f, "{option} must be at least 1 second"),
            FederationConfigError::Listen(err) => write!(f, "listen: {err}"),
        }
    }
}

impl std::error::Error for FederationConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FederationConfigError::InvalidFilter { source, .. } => Some(source),
            FederationConfigError::InvalidAttribute { source, .. } => Some(source),
            FederationConfigError::InvalidUri(err) => Some(err),
            FederationConfigError::InvalidHostPattern { source, .. } => Some(source),
            FederationConfigError::Listen(err) => Some(err),
            FederationConfigError::SubscribeTrue { .. }
            | FederationConfigError::ConnectAllowsNothing { .. }
            | FederationConfigError::InvalidTiming { .. } => None,
        }
    }
}

impl From<UriError> for FederationConfigError {
    fn from(err: UriError) -> Self {
        FederationConfigError::InvalidUri(err)
    }
}

impl From<ListenError> for FederationConfigError {
    fn from(err: ListenError) -> Self {
        FederationConfigError::Listen(err)
    }
}

/// The acceptor and connectors of one router.
pub struct FederationManager {
    server_domain: String,
    classes: Arc<FederationClasses>,
    acceptor: Option<Arc<Acceptor>>,
    connectors: Vec<Arc<Connector>>,
    closed: AtomicBool,
}

impl FederationManager {
    /// Validates `options`, starts listening when `listen` is non-empty and
    /// starts one connector per `connect` URI.
    pub async fn new(
        router: Arc<Router>,
        options: &FederationOptions,
        transport: Arc<dyn FederationTransport>,
        scheduler: Scheduler,
    ) -> Result<Self, FederationConfigError> {
        let server_domain = if options.router_name.trim().is_empty() {
            Uuid::new_v4().to_string()
        } else {
            options.router_name.trim().to_string()
        };

        let timeouts = timeouts_from_options(options)?;

        let classes = Arc::new(classes_from_options(options)?);

        let mut connect = Vec::new();
        for (class_name, uris) in &options.connect {
            let federation_class = classes
                .get(class_name)
                .unwrap_or_else(|| Arc::new(FederationClass::new(class_name.as_str())));
            if federation_class.allows_nothing() {
                return Err(FederationConfigError::ConnectAllowsNothing {
                    class_name: class_name.clone(),
                });
            }
            for uri in uris {
                connect.push((uri.parse::<EwafUri>()?, federation_class.clone()));
            }
        }

        let listen = options
            .listen
            .iter()
            .map(|uri| uri.parse::<EwafUri>())
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            event = events::FEDERATION_START,
            component = COMPONENT,
            server_domain = %server_domain,
            listen_count = listen.len(),
            connect_count = connect.len(),
            "starting federation"
        );

        let acceptor = if listen.is_empty() {
            None
        } else {
            Some(
                Acceptor::bind(
                    router.clone(),
                    server_domain.clone(),
                    classes.clone(),
                    listen,
                    transport.clone(),
                    scheduler.clone(),
                    timeouts,
                )
                .await?,
            )
        };

        let connectors = connect
            .into_iter()
            .map(|(uri, federation_class)| {
                Connector::start(
                    router.clone(),
                    server_domain.clone(),
                    uri,
                    federation_class,
                    transport.clone(),
                    scheduler.clone(),
                    timeouts,
                )
            })
            .collect();

        Ok(Self {
            server_domain,
            classes,
            acceptor,
            connectors,
            closed: AtomicBool::new(false),
        })
    }

    pub fn server_domain(&self) -> &str {
        &self.server_domain
    }

    pub fn classes(&self) -> &Arc<FederationClasses> {
        &self.classes
    }

    pub fn acceptor(&self) -> Option<&Arc<Acceptor>> {
        self.acceptor.as_ref()
    }

    pub fn connectors(&self) -> &[Arc<Connector>] {
        &self.connectors
    }

    pub fn listen_uris(&self) -> &[EwafUri] {
        self.acceptor
            .as_ref()
            .map(|acceptor| acceptor.listen_uris())
            .unwrap_or_default()
    }

    /// Closes the acceptor with all its links, and every connector.
    /// Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(acceptor) = &self.acceptor {
            acceptor.close();
        }
        for connector in &self.connectors {
            connector.close();
        }

        info!(
            event = events::FEDERATION_STOP,
            component = COMPONENT,
            server_domain = %self.server_domain,
            "federation stopped"
        );
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// The link timeouts `options` configure. Both must be non-zero.
pub fn timeouts_from_options(options: &FederationOptions) -> Result<FederationTimeouts, FederationConfigError> {
    if options.request_timeout == 0 {
        return Err(FederationConfigError::InvalidTiming {
            option: "request-timeout",
        });
    }
    if options.keepalive_interval == 0 {
        return Err(FederationConfigError::InvalidTiming {
            option: "keepalive-interval",
        });
    }
    Ok(FederationTimeouts::from(options))
}

/// Builds the class table from the provide, subscribe, apply-class,
/// default-class and add-*-attribute settings.
pub fn classes_from_options(options: &FederationOptions) -> Result<FederationClasses, FederationConfigError> {
    let mut classes = FederationClasses::new();

    for (class_name, filter) in &options.provide {
        classes.define(class_name).outgoing_filter = parse_class_filter(class_name, filter)?;
    }

    for (class_name, filter) in &options.subscribe {
        let incoming_filter = parse_class_filter(class_name, filter)?;
        if incoming_filter == CONST_TRUE {
            return Err(FederationConfigError::SubscribeTrue {
                class_name: class_name.clone(),
            });
        }
        classes.define(class_name).incoming_filter = incoming_filter;
    }

    for (class_name, patterns) in &options.apply_class {
        for pattern in patterns {
            let pattern = pattern.replace('@', "");
            classes
                .map(&pattern, class_name)
                .map_err(|source| FederationConfigError::InvalidHostPattern { pattern, source })?;
        }
    }

    classes.set_default_class(&options.default_class);

    for (class_name, values) in &options.add_incoming_attribute {
        classes.define(class_name).incoming_attributes = parse_attributes(class_name, values)?;
    }
    for (class_name, values) in &options.add_outgoing_attribute {
        classes.define(class_name).outgoing_attributes = parse_attributes(class_name, values)?;
    }

    Ok(classes)
}

fn parse_class_filter(class_name: &str, filter: &str) -> Result<Node, FederationConfigError> {
    FederationClass::parse_filter(filter).map_err(|source| FederationConfigError::InvalidFilter {
        class_name: class_name.to_string(),
        filter: filter.to_string(),
        source,
    })
}

fn parse_attributes(
    class_name: &str,
    values: &BTreeMap<String, String>,
) -> Result<Attributes, FederationConfigError> {
    values
        .iter()
        .map(|(attribute, expr)| {
            parse_value_expr(expr)
                .map(|value| (attribute.clone(), value))
                .map_err(|source| FederationConfigError::InvalidAttribute {
                    class_name: class_name.to_string(),
                    attribute: attribute.clone(),
                    source,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::ConnectionOptions;
    use crate::subscription::{Value, CONST_FALSE};
    use crate::transport::{DialError, RemoteAddress, Session, SessionHandler};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct StubTransport {
        listening: Mutex<Vec<EwafUri>>,
    }

    #[async_trait]
    impl FederationTransport for StubTransport {
        async fn dial(
            &self,
            uri: &EwafUri,
            _handler: Arc<dyn SessionHandler>,
        ) -> Result<Arc<dyn Session>, DialError> {
            Err(DialError::Refused(uri.clone()))
        }

        async fn listen(&self, uri: &EwafUri, _handler: Arc<dyn SessionHandler>) -> Result<(), ListenError> {
            let mut listening = self.listening.lock();
            if listening.contains(uri) {
                return Err(ListenError::AddressInUse(uri.clone()));
            }
            listening.push(uri.clone());
            Ok(())
        }

        async fn unlisten(&self, uri: &EwafUri) {
            self.listening.lock().retain(|bound| bound != uri);
        }
    }

    fn options(text: &str) -> FederationOptions {
        json5::from_str(text).unwrap()
    }

    async fn manager(options: &FederationOptions) -> Result<FederationManager, FederationConfigError> {
        FederationManager::new(
            Arc::new(Router::new(ConnectionOptions::default()).unwrap()),
            options,
            Arc::new(StubTransport::default()),
            Scheduler::current().unwrap(),
        )
        .await
    }

    #[test]
    fn builds_classes_from_options() {
        let classes = classes_from_options(&options(
            r#"{
                "provide": { "Partners": "require(federated)" },
                "subscribe": { "partners": "require(federated)", "public": "false" },
                "apply-class": { "partners": ["@*.partner.example.com"] },
                "default-class": "public",
                "add-incoming-attribute": { "partners": { "From-Partner": "'yes'" } },
            }"#,
        ))
        .unwrap();

        let partner = classes.class_for(&RemoteAddress::new("r1.partner.example.com", 2916));
        assert_ne!(partner.incoming_filter, CONST_FALSE);
        assert_ne!(partner.outgoing_filter, CONST_FALSE);
        assert_eq!(partner.incoming_attributes["From-Partner"], Value::from("yes"));

        let other = classes.class_for(&RemoteAddress::new("elsewhere.org", 2916));
        assert_eq!(other.name, "public");
        assert!(other.allows_nothing());
    }

    #[test]
    fn subscribe_true_is_rejected() {
        let err = classes_from_options(&options(r#"{ "subscribe": { "all": "TRUE" } }"#)).unwrap_err();

        assert!(matches!(err, FederationConfigError::SubscribeTrue { .. }));
    }

    #[test]
    fn bad_filter_and_attribute_are_rejected() {
        let err = classes_from_options(&options(r#"{ "provide": { "p": "x ==" } }"#)).unwrap_err();
        assert!(matches!(err, FederationConfigError::InvalidFilter { .. }));

        let err = classes_from_options(&options(
            r#"{ "add-outgoing-attribute": { "p": { "x": "'unterminated" } } }"#,
        ))
        .unwrap_err();
        assert!(matches!(err, FederationConfigError::InvalidAttribute { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn connect_class_must_allow_something() {
        let err = manager(&options(r#"{ "connect": { "nothing": ["ewaf://b:2916"] } }"#))
            .await
            .err()
            .unwrap();

        assert!(matches!(err, FederationConfigError::ConnectAllowsNothing { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_uri_is_rejected() {
        let err = manager(&options(r#"{ "listen": ["http://b:2916"] }"#))
            .await
            .err()
            .unwrap();

        assert!(matches!(err, FederationConfigError::InvalidUri(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_listen_uri_fails_to_bind() {
        let err = manager(&options(r#"{ "listen": ["ewaf://a:2916", "ewaf://a:2916"] }"#))
            .await
            .err()
            .unwrap();

        assert!(matches!(err, FederationConfigError::Listen(ListenError::AddressInUse(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn starts_and_closes() {
        let manager = manager(&options(
            r#"{
                "router-name": "a",
                "listen": ["ewaf://a:2916"],
                "provide": { "partners": "require(federated)" },
                "connect": { "partners": ["ewaf://b:2916", "ewaf://c"] },
            }"#,
        ))
        .await
        .unwrap();

        assert_eq!(manager.server_domain(), "a");
        assert_eq!(manager.listen_uris(), &[EwafUri::new("a", 2916)]);
        assert_eq!(manager.connectors().len(), 2);

        manager.close();
        manager.close();

        assert!(manager.is_closed());
        assert!(manager.connectors().iter().all(|c| c.is_closing()));
        assert!(manager.acceptor().is_some_and(|a| a.is_closing()));
    }

    #[tokio::test(start_paused = true)]
    async fn default_router_name_is_generated() {
        let first = manager(&FederationOptions::default()).await.unwrap();
        let second = manager(&FederationOptions::default()).await.unwrap();

        assert!(!first.server_domain().is_empty());
        assert_ne!(first.server_domain(), second.server_domain());
    }
}
