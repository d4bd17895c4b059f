//! Host-to-class resolution.

use super::FederationClass;
use crate::subscription::wildcard;
use crate::transport::RemoteAddress;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A case-insensitive wildcard over host names and literal addresses.
#[derive(Debug, Clone)]
struct HostPattern {
    regex: Regex,
}

impl HostPattern {
    fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: wildcard::to_regex(pattern.trim(), true)?,
        })
    }

    fn matches(&self, address: &RemoteAddress) -> bool {
        self.regex.is_match(&address.host_name)
            || address
                .resolved_host_name
                .as_deref()
                .is_some_and(|name| self.regex.is_match(name))
            || address
                .ip
                .is_some_and(|ip| self.regex.is_match(&ip.to_string()))
    }
}

/// Named federation classes plus an ordered host-pattern mapping.
///
/// Built once at startup. Classes are handed out as shared, read-only
/// `Arc`s to every link that uses them.
#[derive(Debug, Clone)]
pub struct FederationClasses {
    classes: BTreeMap<String, Arc<FederationClass>>,
    host_to_class: Vec<(HostPattern, String)>,
    default_class: String,
}

fn key(name: &str) -> String {
    name.to_lowercase()
}

impl FederationClasses {
    /// An empty table whose default is the empty-named class.
    pub fn new() -> Self {
        let mut classes = Self {
            classes: BTreeMap::new(),
            host_to_class: Vec::new(),
            default_class: String::new(),
        };
        classes.define("");
        classes
    }

    /// Looks up `name` case-insensitively, creating an allow-nothing class
    /// if it does not exist yet.
    pub fn define(&mut self, name: &str) -> &mut FederationClass {
        let class = self
            .classes
            .entry(key(name))
            .or_insert_with(|| Arc::new(FederationClass::new(name)));
        Arc::make_mut(class)
    }

    pub fn get(&self, name: &str) -> Option<Arc<FederationClass>> {
        self.classes.get(&key(name)).cloned()
    }

    pub fn set_default_class(&mut self, name: &str) {
        self.define(name);
        self.default_class = key(name);
    }

    pub fn default_class(&self) -> Arc<FederationClass> {
        self.lookup(&self.default_class)
    }

    /// Appends a mapping. Earlier mappings win.
    pub fn map(&mut self, host_pattern: &str, class_name: &str) -> Result<(), regex::Error> {
        let pattern = HostPattern::new(host_pattern)?;
        self.define(class_name);
        self.host_to_class.push((pattern, key(class_name)));
        Ok(())
    }

    /// The class of the first mapping matching `address`, else the default.
    pub fn class_for(&self, address: &RemoteAddress) -> Arc<FederationClass> {
        self.host_to_class
            .iter()
            .find(|(pattern, _)| pattern.matches(address))
            .map(|(_, name)| self.lookup(name))
            .unwrap_or_else(|| self.default_class())
    }

    fn lookup(&self, key: &str) -> Arc<FederationClass> {
        self.classes
            .get(key)
            .cloned()
            .unwrap_or_else(|| Arc::new(FederationClass::new(key)))
    }
}

impl Default for FederationClasses {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::CONST_TRUE;
    use std::net::{IpAddr, Ipv4Addr};

    fn classes() -> FederationClasses {
        let mut classes = FederationClasses::new();
        classes.define("Partners").outgoing_filter = CONST_TRUE;
        classes.define("internal").incoming_filter = CONST_TRUE;
        classes.map("*.partner.example.com", "partners").unwrap();
        classes.map("10.0.*", "Internal").unwrap();
        classes.map("*", "partners").unwrap();
        classes
    }

    #[test]
    fn first_match_wins() {
        let classes = classes();

        let partner = RemoteAddress::new("Relay.PARTNER.example.com", 2916);
        assert_eq!(classes.class_for(&partner).name, "Partners");

        let internal = RemoteAddress::new("relay.partner.example.com", 2916)
            .with_ip(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(classes.class_for(&internal).name, "Partners");
    }

    #[test]
    fn matches_literal_address_and_resolved_name() {
        let mut classes = FederationClasses::new();
        classes.define("internal").incoming_filter = CONST_TRUE;
        classes.map("10.0.*", "internal").unwrap();
        classes.map("*.corp", "internal").unwrap();

        let by_ip = RemoteAddress::new("unknown", 2916).with_ip(IpAddr::V4(Ipv4Addr::new(10, 0, 3, 1)));
        assert_eq!(classes.class_for(&by_ip).name, "internal");

        let by_resolved = RemoteAddress::new("192.168.1.1", 2916).with_resolved_host_name("db.corp");
        assert_eq!(classes.class_for(&by_resolved).name, "internal");
    }

    #[test]
    fn falls_back_to_default() {
        let mut classes = FederationClasses::new();
        classes.map("*.example.com", "named").unwrap();

        let other = RemoteAddress::new("elsewhere.org", 2916);
        assert_eq!(classes.class_for(&other).name, "");
        assert!(classes.class_for(&other).allows_nothing());

        classes.set_default_class("Fallback");
        assert_eq!(classes.class_for(&other).name, "Fallback");
    }

    #[test]
    fn class_names_are_case_insensitive() {
        let mut classes = FederationClasses::new();
        classes.define("Public").incoming_filter = CONST_TRUE;

        assert_eq!(classes.get("PUBLIC").map(|class| class.incoming_filter.clone()), Some(CONST_TRUE));
    }
}
