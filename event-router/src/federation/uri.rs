//! `ewaf:` federation endpoint URIs.

use crate::messages::{DEFAULT_EWAF_PORT, FEDERATION_VERSION_MAJOR, FEDERATION_VERSION_MINOR};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

const SCHEME: &str = "ewaf:";

/// A federation endpoint: `ewaf:[major.minor]//host[:port]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EwafUri {
    pub version_major: i32,
    pub version_minor: i32,
    pub host: String,
    pub port: u16,
}

impl EwafUri {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            version_major: FEDERATION_VERSION_MAJOR,
            version_minor: FEDERATION_VERSION_MINOR,
            host: host.into(),
            port,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriError {
    pub uri: String,
    pub reason: &'static str,
}

impl Display for UriError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid federation URI \"{}\": {}", self.uri, self.reason)
    }
}

impl std::error::Error for UriError {}

impl FromStr for EwafUri {
    type Err = UriError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| UriError {
            uri: text.to_string(),
            reason,
        };

        let rest = text
            .trim()
            .strip_prefix(SCHEME)
            .ok_or_else(|| invalid("scheme must be \"ewaf:\""))?;
        let (version, authority) = rest
            .split_once("//")
            .ok_or_else(|| invalid("missing \"//\" before host"))?;

        let (version_major, version_minor) = if version.is_empty() {
            (FEDERATION_VERSION_MAJOR, FEDERATION_VERSION_MINOR)
        } else {
            let (major, minor) = version
                .split_once('.')
                .ok_or_else(|| invalid("version must be major.minor"))?;
            (
                major.parse().map_err(|_| invalid("bad major version"))?,
                minor.parse().map_err(|_| invalid("bad minor version"))?,
            )
        };

        let authority = authority.trim_end_matches('/');
        let (host, port) = split_host_port(authority).ok_or_else(|| invalid("bad host or port"))?;
        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        Ok(Self {
            version_major,
            version_minor,
            host: host.to_string(),
            port,
        })
    }
}

fn split_host_port(authority: &str) -> Option<(&str, u16)> {
    if let Some(bracketed) = authority.strip_prefix('[') {
        let (host, rest) = bracketed.split_once(']')?;
        return match rest.strip_prefix(':') {
            Some(port) => Some((host, port.parse().ok()?)),
            None if rest.is_empty() => Some((host, DEFAULT_EWAF_PORT)),
            None => None,
        };
    }

    match authority.rsplit_once(':') {
        Some((host, port)) => Some((host, port.parse().ok()?)),
        None => Some((authority, DEFAULT_EWAF_PORT)),
    }
}

impl Display for EwafUri {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        write!(
            f,
            "{SCHEME}{}.{}//{host}:{}",
            self.version_major, self.version_minor, self.port
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_version_and_port() {
        let uri: EwafUri = "ewaf://router.example.com".parse().unwrap();

        assert_eq!(uri, EwafUri::new("router.example.com", 2916));
    }

    #[test]
    fn explicit_version_and_port() {
        let uri: EwafUri = "ewaf:1.0//10.0.0.1:3000".parse().unwrap();

        assert_eq!(uri.version_major, 1);
        assert_eq!(uri.host, "10.0.0.1");
        assert_eq!(uri.port, 3000);
        assert_eq!(uri.to_string(), "ewaf:1.0//10.0.0.1:3000");
    }

    #[test]
    fn bracketed_ipv6_host() {
        let uri: EwafUri = "ewaf://[::1]:2917".parse().unwrap();

        assert_eq!(uri.host, "::1");
        assert_eq!(uri.to_string(), "ewaf:1.0//[::1]:2917");
    }

    #[test]
    fn malformed_uris() {
        for text in ["elvin://host", "ewaf:host", "ewaf://", "ewaf://host:port", "ewaf:x.y//host"] {
            assert!(text.parse::<EwafUri>().is_err(), "{text} should be rejected");
        }
    }
}
