//! Per-connection limits and client option negotiation.

use crate::messages::OptionMap;
use crate::subscription::Value;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub const SUBSCRIPTION_MAX_COUNT: &str = "Subscription.Max-Count";
pub const SUBSCRIPTION_MAX_LENGTH: &str = "Subscription.Max-Length";
pub const CONNECTION_MAX_KEYS: &str = "Connection.Max-Keys";
pub const SUBSCRIPTION_MAX_KEYS: &str = "Subscription.Max-Keys";
pub const VENDOR_IDENTIFICATION: &str = "Vendor-Identification";

/// Accepted range of one connection option.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OptionRange {
    pub name: &'static str,
    pub min: u32,
    pub default: u32,
    pub max: u32,
}

impl OptionRange {
    pub fn contains(&self, value: u32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

pub const OPTION_RANGES: [OptionRange; 4] = [
    OptionRange {
        name: SUBSCRIPTION_MAX_COUNT,
        min: 16,
        default: 2048,
        max: 2048,
    },
    OptionRange {
        name: SUBSCRIPTION_MAX_LENGTH,
        min: 1024,
        default: 2048,
        max: 4096,
    },
    OptionRange {
        name: CONNECTION_MAX_KEYS,
        min: 0,
        default: 1024,
        max: 1024,
    },
    OptionRange {
        name: SUBSCRIPTION_MAX_KEYS,
        min: 0,
        default: 256,
        max: 1024,
    },
];

fn range_for(name: &str) -> Option<&'static OptionRange> {
    OPTION_RANGES.iter().find(|range| range.name == name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidOption {
    pub name: &'static str,
    pub value: u32,
}

impl Display for InvalidOption {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match range_for(self.name) {
            Some(range) => write!(
                f,
                "{} = {} is outside {}..={}",
                self.name, self.value, range.min, range.max
            ),
            None => write!(f, "{} = {} is not a connection option", self.name, self.value),
        }
    }
}

impl std::error::Error for InvalidOption {}

/// Limits enforced on one client connection. The router's configured
/// values act as defaults for options a client does not request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionOptions {
    #[serde(rename = "Subscription.Max-Count", default = "default_max_count")]
    pub subscription_max_count: u32,
    #[serde(rename = "Subscription.Max-Length", default = "default_max_length")]
    pub subscription_max_length: u32,
    #[serde(rename = "Connection.Max-Keys", default = "default_connection_max_keys")]
    pub connection_max_keys: u32,
    #[serde(rename = "Subscription.Max-Keys", default = "default_subscription_max_keys")]
    pub subscription_max_keys: u32,
}

fn default_max_count() -> u32 {
    OPTION_RANGES[0].default
}

fn default_max_length() -> u32 {
    OPTION_RANGES[1].default
}

fn default_connection_max_keys() -> u32 {
    OPTION_RANGES[2].default
}

fn default_subscription_max_keys() -> u32 {
    OPTION_RANGES[3].default
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            subscription_max_count: default_max_count(),
            subscription_max_length: default_max_length(),
            connection_max_keys: default_connection_max_keys(),
            subscription_max_keys: default_subscription_max_keys(),
        }
    }
}

impl ConnectionOptions {
    pub fn get(&self, name: &str) -> Option<u32> {
        match name {
            SUBSCRIPTION_MAX_COUNT => Some(self.subscription_max_count),
            SUBSCRIPTION_MAX_LENGTH => Some(self.subscription_max_length),
            CONNECTION_MAX_KEYS => Some(self.connection_max_keys),
            SUBSCRIPTION_MAX_KEYS => Some(self.subscription_max_keys),
            _ => None,
        }
    }

    fn set(&mut self, name: &str, value: u32) {
        match name {
            SUBSCRIPTION_MAX_COUNT => self.subscription_max_count = value,
            SUBSCRIPTION_MAX_LENGTH => self.subscription_max_length = value,
            CONNECTION_MAX_KEYS => self.connection_max_keys = value,
            SUBSCRIPTION_MAX_KEYS => self.subscription_max_keys = value,
            _ => {}
        }
    }

    /// Checks every option lies within its accepted range.
    pub fn validate(&self) -> Result<(), InvalidOption> {
        for range in &OPTION_RANGES {
            let value = self.get(range.name).unwrap_or(range.default);
            if !range.contains(value) {
                return Err(InvalidOption {
                    name: range.name,
                    value,
                });
            }
        }
        Ok(())
    }

    /// Applies a client's requested options on top of these defaults.
    ///
    /// Returns the effective options and the map to send back in
    /// `ConnRply`. A request that is out of range or not an integer falls
    /// back to the default; unknown option names are left out of the reply.
    pub fn negotiate(&self, requested: &OptionMap) -> (ConnectionOptions, OptionMap) {
        let mut effective = self.clone();
        let mut accepted = OptionMap::new();

        for (name, value) in requested {
            let Some(range) = range_for(name) else {
                continue;
            };

            let requested_value = match value {
                Value::Int32(v) => u32::try_from(*v).ok(),
                Value::Int64(v) => u32::try_from(*v).ok(),
                _ => None,
            };

            if let Some(v) = requested_value.filter(|v| range.contains(*v)) {
                effective.set(range.name, v);
            }

            let actual = effective.get(range.name).unwrap_or(range.default);
            accepted.insert(name.clone(), Value::Int32(actual as i32));
        }

        (effective, accepted)
    }
}
