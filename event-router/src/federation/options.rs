//! Federation configuration as read from the config file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Federation settings. Maps keyed by class name configure that class;
/// class names are case-insensitive.
///
/// ```
/// use event_router::federation::FederationOptions;
///
/// let options: FederationOptions = json5::from_str(r#"{
///     "router-name": "router-a",
///     "listen": ["ewaf://0.0.0.0:2916"],
///     "subscribe": { "partners": "require(federated)" },
///     "provide": { "partners": "require(federated)" },
///     "apply-class": { "partners": ["*.partner.example.com"] },
/// }"#).unwrap();
///
/// assert_eq!(options.request_timeout, 20);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FederationOptions {
    /// This router's server domain. A random one is generated when empty.
    #[serde(default)]
    pub router_name: String,
    /// `ewaf:` URIs to accept federation links on.
    #[serde(default)]
    pub listen: Vec<String>,
    /// Class name to the `ewaf:` URIs to dial with that class.
    #[serde(default)]
    pub connect: BTreeMap<String, Vec<String>>,
    /// Class name to incoming filter.
    #[serde(default)]
    pub subscribe: BTreeMap<String, String>,
    /// Class name to outgoing filter.
    #[serde(default)]
    pub provide: BTreeMap<String, String>,
    /// Class name to host patterns resolved to that class, in order.
    #[serde(default)]
    pub apply_class: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub default_class: String,
    /// Class name to attribute name to value expression.
    #[serde(default)]
    pub add_incoming_attribute: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub add_outgoing_attribute: BTreeMap<String, BTreeMap<String, String>>,
    /// Seconds before an unanswered request or liveness probe fails, and
    /// between connector retries.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    /// Seconds of silence before a liveness probe is sent.
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval: u64,
}

fn default_request_timeout() -> u64 {
    20
}

fn default_keepalive_interval() -> u64 {
    60
}

impl Default for FederationOptions {
    fn default() -> Self {
        Self {
            router_name: String::new(),
            listen: Vec::new(),
            connect: BTreeMap::new(),
            subscribe: BTreeMap::new(),
            provide: BTreeMap::new(),
            apply_class: BTreeMap::new(),
            default_class: String::new(),
            add_incoming_attribute: BTreeMap::new(),
            add_outgoing_attribute: BTreeMap::new(),
            request_timeout: default_request_timeout(),
            keepalive_interval: default_keepalive_interval(),
        }
    }
}

impl FederationOptions {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval)
    }
}
