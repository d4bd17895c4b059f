//! Router-to-router federation.
//!
//! Routers exchange notifications over federation links. Each link is
//! governed by a [`FederationClass`] chosen from the remote host name: the
//! class's incoming filter decides what this router pulls, its outgoing
//! filter what it pushes. The remote's own incoming filter arrives in a
//! `FedSubReplace` and further restricts what is pushed to it.
//!
//! An [`Acceptor`] serves incoming links, a [`Connector`] dials and
//! redials one outgoing link, and a [`FederationManager`] builds both from
//! [`FederationOptions`].
//!
//! ```
//! use event_router::federation::{FederationClass, FederationClasses};
//! use event_router::transport::RemoteAddress;
//!
//! let mut classes = FederationClasses::new();
//! classes.define("partners").outgoing_filter =
//!     FederationClass::parse_filter("require(Public)").unwrap();
//! classes.map("*.partner.example.com", "partners").unwrap();
//!
//! let class = classes.class_for(&RemoteAddress::new("r1.PARTNER.example.com", 2916));
//! assert_eq!(class.name, "partners");
//! assert!(!class.allows_nothing());
//!
//! // Unmapped hosts get the default class, which allows nothing.
//! assert!(classes.class_for(&RemoteAddress::new("elsewhere.org", 2916)).allows_nothing());
//! ```

mod acceptor;
mod class;
mod classes;
mod connector;
mod link;
mod manager;
mod options;
mod timeouts;
mod uri;

pub use acceptor::{Acceptor, HANDSHAKE_TIMEOUT};
pub use class::FederationClass;
pub use classes::FederationClasses;
pub use connector::Connector;
pub use link::Link;
pub use manager::{
    classes_from_options, timeouts_from_options, FederationConfigError, FederationManager,
};
pub use options::FederationOptions;
pub use timeouts::FederationTimeouts;
pub use uri::{EwafUri, UriError};

/// Server domains compare case-insensitively.
pub(crate) fn same_domain(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}
