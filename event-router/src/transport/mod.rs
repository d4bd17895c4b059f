//! Session abstraction and the session filters layered over it.
//!
//! The crate never touches sockets or bytes. A transport provides
//! [`Session`]s and drives a [`SessionHandler`] per session; the filters
//! here wrap a handler to add request tracking and liveness probing.

mod dialer;
mod liveness;
mod request_tracker;
mod session;

pub use dialer::{DialError, FederationTransport, ListenError};
pub use liveness::LivenessFilter;
pub use request_tracker::{RequestTrackingFilter, TrackedSession};
pub use session::{
    RemoteAddress, Session, SessionAttributes, SessionError, SessionHandler, SessionId,
};
