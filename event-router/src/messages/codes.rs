//! Numeric codes carried by `Nack` and `Disconn` messages.

/// `Nack` error codes.
pub mod nack {
    /// Incompatible protocol version.
    pub const PROT_INCOMPAT: i32 = 1;
    pub const PROT_ERROR: i32 = 1001;
    pub const NO_SUCH_SUB: i32 = 1002;
    /// A connection or subscription limit was exceeded.
    pub const IMPL_LIMIT: i32 = 2006;
    pub const NOT_IMPL: i32 = 2007;
    pub const PARSE_ERROR: i32 = 2101;
    /// The subscription expression is constant.
    pub const EXP_IS_TRIVIAL: i32 = 2110;
    /// Federation handshake rejected for the offered server domain.
    pub const INVALID_DOMAIN: i32 = 2500;
}

/// `Disconn` reason codes.
///
/// Negative codes never go on the wire. Federation links use them to record
/// why they closed a session without sending a `Disconn`.
pub mod disconnect {
    pub const SHUTDOWN: i32 = 1;
    pub const SHUTDOWN_REDIRECT: i32 = 2;
    pub const PROTOCOL_VIOLATION: i32 = 4;

    /// The remote router sent `Disconn`.
    pub const DISCONN_REQUESTED: i32 = -1;
    /// The remote router rejected a request with a `Nack`.
    pub const REQUEST_REJECTED: i32 = -2;
    /// The remote router stopped answering liveness checks.
    pub const FEDERATOR_NOT_RESPONDING: i32 = -3;
}
