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

use event_router::federation::{
    classes_from_options, timeouts_from_options, EwafUri, FederationClass, FederationConfigError,
    FederationOptions,
};
use event_router::router::{ConnectionOptions, InvalidOption};
use event_router::subscription::{unparse, Attributes};
use event_router::transport::RemoteAddress;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub(crate) router: ConnectionOptions,
    #[serde(default)]
    pub(crate) federation: FederationOptions,
}

#[derive(Debug)]
pub enum ConfigError {
    Read(std::io::Error),
    Parse(json5::Error),
    Router(InvalidOption),
    Federation(FederationConfigError),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read(err) => write!(f, "Unable to read config file: {err}"),
            ConfigError::Parse(err) => write!(f, "Unable to parse config file: {err}"),
            ConfigError::Router(err) => write!(f, "Invalid router option: {err}"),
            ConfigError::Federation(err) => write!(f, "Invalid federation option: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read(err) => Some(err),
            ConfigError::Parse(err) => Some(err),
            ConfigError::Router(err) => Some(err),
            ConfigError::Federation(err) => Some(err),
        }
    }
}

impl From<FederationConfigError> for ConfigError {
    fn from(err: FederationConfigError) -> Self {
        ConfigError::Federation(err)
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "kebab-case")]
pub struct ClassReport {
    pub(crate) incoming_filter: String,
    pub(crate) outgoing_filter: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub(crate) incoming_attributes: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub(crate) outgoing_attributes: BTreeMap<String, String>,
}

impl From<&FederationClass> for ClassReport {
    fn from(class: &FederationClass) -> Self {
        Self {
            incoming_filter: unparse(&class.incoming_filter),
            outgoing_filter: unparse(&class.outgoing_filter),
            incoming_attributes: describe(&class.incoming_attributes),
            outgoing_attributes: describe(&class.outgoing_attributes),
        }
    }
}

fn describe(attributes: &Attributes) -> BTreeMap<String, String> {
    attributes
        .iter()
        .map(|(name, value)| (name.clone(), format!("{value:?}")))
        .collect()
}

/// What a validated configuration amounts to.
#[derive(Serialize, Debug)]
#[serde(rename_all = "kebab-case")]
pub struct Report {
    pub(crate) router: ConnectionOptions,
    pub(crate) router_name: Option<String>,
    pub(crate) listen: Vec<String>,
    /// Class name to the URIs dialled with it.
    pub(crate) connect: BTreeMap<String, Vec<String>>,
    pub(crate) request_timeout_secs: u64,
    pub(crate) keepalive_interval_secs: u64,
    /// Host name to the class a link from it would get.
    pub(crate) resolved: BTreeMap<String, String>,
    pub(crate) classes: BTreeMap<String, ClassReport>,
}

impl Config {
    pub fn from_json5(text: &str) -> Result<Self, ConfigError> {
        json5::from_str(text).map_err(ConfigError::Parse)
    }

    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(ConfigError::Read)?;
        Self::from_json5(&text)
    }

    /// Checks everything a router would check at startup, without binding
    /// or dialling anything, and resolves `hosts` to their classes.
    pub fn validate(&self, hosts: &[String]) -> Result<Report, ConfigError> {
        self.router.validate().map_err(ConfigError::Router)?;

        let federation = &self.federation;
        let timeouts = timeouts_from_options(federation)?;
        let classes = classes_from_options(federation)?;

        let listen = federation
            .listen
            .iter()
            .map(|uri| uri.parse::<EwafUri>().map(|uri| uri.to_string()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(FederationConfigError::from)?;

        let mut connect = BTreeMap::new();
        let mut reported = BTreeMap::new();
        for (class_name, uris) in &federation.connect {
            let class = classes
                .get(class_name)
                .unwrap_or_else(|| std::sync::Arc::new(FederationClass::new(class_name.as_str())));
            if class.allows_nothing() {
                return Err(FederationConfigError::ConnectAllowsNothing {
                    class_name: class_name.clone(),
                }
                .into());
            }
            let uris = uris
                .iter()
                .map(|uri| uri.parse::<EwafUri>().map(|uri| uri.to_string()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(FederationConfigError::from)?;
            connect.insert(class_name.clone(), uris);
            reported.insert(class.name.clone(), ClassReport::from(class.as_ref()));
        }

        let mut resolved = BTreeMap::new();
        for host in hosts {
            let class = classes.class_for(&RemoteAddress::new(host.clone(), 0));
            resolved.insert(host.clone(), class.name.clone());
            reported.insert(class.name.clone(), ClassReport::from(class.as_ref()));
        }

        let class_names = federation
            .subscribe
            .keys()
            .chain(federation.provide.keys())
            .chain(federation.apply_class.keys());
        for class_name in class_names {
            if let Some(class) = classes.get(class_name) {
                reported.insert(class.name.clone(), ClassReport::from(class.as_ref()));
            }
        }

        let router_name = federation.router_name.trim();

        Ok(Report {
            router: self.router.clone(),
            router_name: (!router_name.is_empty()).then(|| router_name.to_string()),
            listen,
            connect,
            request_timeout_secs: timeouts.request_timeout.as_secs(),
            keepalive_interval_secs: timeouts.keepalive_interval.as_secs(),
            resolved,
            classes: reported,
        })
    }
}
