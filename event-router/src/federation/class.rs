//! Import/export policy applied to one or more remote routers.

use crate::subscription::{parse_and_validate, Attributes, Node, ParseError, CONST_FALSE, CONST_TRUE};

/// What may cross a federation link. A filter of [`CONST_FALSE`] means
/// nothing flows in that direction.
#[derive(Debug, Clone, PartialEq)]
pub struct FederationClass {
    pub name: String,
    /// Notifications this router pulls from the remote.
    pub incoming_filter: Node,
    /// Notifications this router pushes to the remote.
    pub outgoing_filter: Node,
    /// Merged into every pulled notification.
    pub incoming_attributes: Attributes,
    /// Merged into every pushed notification.
    pub outgoing_attributes: Attributes,
}

impl FederationClass {
    /// A class that allows nothing in either direction.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_filters(name, CONST_FALSE, CONST_FALSE)
    }

    pub fn with_filters(name: impl Into<String>, incoming_filter: Node, outgoing_filter: Node) -> Self {
        Self {
            name: name.into(),
            incoming_filter,
            outgoing_filter,
            incoming_attributes: Attributes::new(),
            outgoing_attributes: Attributes::new(),
        }
    }

    /// True when no link may exist for remotes mapped to this class.
    pub fn allows_nothing(&self) -> bool {
        self.incoming_filter == CONST_FALSE && self.outgoing_filter == CONST_FALSE
    }

    /// Parses a configured filter. `true` and `false` (any case) are
    /// accepted as constants, unlike in client subscriptions.
    pub fn parse_filter(text: &str) -> Result<Node, ParseError> {
        let text = text.trim();

        if text.eq_ignore_ascii_case("true") {
            Ok(CONST_TRUE)
        } else if text.eq_ignore_ascii_case("false") {
            Ok(CONST_FALSE)
        } else {
            parse_and_validate(text)
        }
    }
}
