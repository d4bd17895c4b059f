//! The seam between federation and a concrete network transport.

use crate::federation::EwafUri;
use crate::transport::{Session, SessionHandler};
use async_trait::async_trait;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialError {
    /// Nothing is listening at the URI.
    Refused(EwafUri),
    Transport { uri: EwafUri, message: String },
}

impl Display for DialError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DialError::Refused(uri) => write!(f, "connection to {uri} refused"),
            DialError::Transport { uri, message } => write!(f, "cannot connect to {uri}: {message}"),
        }
    }
}

impl std::error::Error for DialError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenError {
    AddressInUse(EwafUri),
    Transport { uri: EwafUri, message: String },
}

impl Display for ListenError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenError::AddressInUse(uri) => write!(f, "{uri} is already in use"),
            ListenError::Transport { uri, message } => write!(f, "cannot listen on {uri}: {message}"),
        }
    }
}

impl std::error::Error for ListenError {}

/// Opens federation sessions. Implementations encode and decode messages;
/// protocol code only sees [`Session`] and [`SessionHandler`].
#[async_trait]
pub trait FederationTransport: Send + Sync {
    /// Connects to `uri`. `handler.session_opened` has run by the time this
    /// returns successfully.
    async fn dial(
        &self,
        uri: &EwafUri,
        handler: Arc<dyn SessionHandler>,
    ) -> Result<Arc<dyn Session>, DialError>;

    /// Accepts sessions at `uri`, each driven by `handler`.
    async fn listen(&self, uri: &EwafUri, handler: Arc<dyn SessionHandler>) -> Result<(), ListenError>;

    /// Stops accepting at `uri`. Established sessions stay open.
    async fn unlisten(&self, uri: &EwafUri);
}
