//! Canonical structured event names used across `event-router`.

// Client session events.
pub const CLIENT_CONNECTED: &str = "client_connected";
pub const CLIENT_DISCONNECTED: &str = "client_disconnected";
pub const CLIENT_REQUEST_REJECTED: &str = "client_request_rejected";
pub const CLIENT_PROTOCOL_VIOLATION: &str = "client_protocol_violation";
pub const SUBSCRIPTION_ADD: &str = "subscription_add";
pub const SUBSCRIPTION_MODIFY: &str = "subscription_modify";
pub const SUBSCRIPTION_DELETE: &str = "subscription_delete";
pub const ROUTER_SHUTDOWN: &str = "router_shutdown";

// Delivery events.
pub const DELIVERY_SEND_FAILED: &str = "delivery_send_failed";
pub const DELIVERY_LISTENER_ADD: &str = "delivery_listener_add";
pub const DELIVERY_LISTENER_REMOVE: &str = "delivery_listener_remove";

// Session filter events.
pub const REQUEST_TIMEOUT: &str = "request_timeout";
pub const REPLY_UNKNOWN_XID: &str = "reply_unknown_xid";
pub const LIVENESS_PROBE_SENT: &str = "liveness_probe_sent";
pub const LIVENESS_FAILED: &str = "liveness_failed";

// Federation link events.
pub const LINK_ESTABLISHED: &str = "link_established";
pub const LINK_SUBSCRIBED: &str = "link_subscribed";
pub const LINK_RESUBSCRIBE: &str = "link_resubscribe";
pub const LINK_PUSH: &str = "link_push";
pub const LINK_PULL_ACCEPTED: &str = "link_pull_accepted";
pub const LINK_PULL_DROPPED: &str = "link_pull_dropped";
pub const LINK_DROP_WARN: &str = "link_drop_warn";
pub const LINK_PROTOCOL_VIOLATION: &str = "link_protocol_violation";
pub const LINK_SEND_FAILED: &str = "link_send_failed";
pub const LINK_CLOSED: &str = "link_closed";

// Federation acceptor events.
pub const ACCEPTOR_LISTEN_OK: &str = "acceptor_listen_ok";
pub const ACCEPTOR_LISTEN_FAILED: &str = "acceptor_listen_failed";
pub const ACCEPTOR_HANDSHAKE_REJECTED: &str = "acceptor_handshake_rejected";
pub const ACCEPTOR_HANDSHAKE_TIMEOUT: &str = "acceptor_handshake_timeout";
pub const ACCEPTOR_UNEXPECTED_MESSAGE: &str = "acceptor_unexpected_message";
pub const ACCEPTOR_LINK_SESSION_CLOSED: &str = "acceptor_link_session_closed";

// Federation connector events.
pub const CONNECTOR_CONNECT_START: &str = "connector_connect_start";
pub const CONNECTOR_CONNECT_FAILED: &str = "connector_connect_failed";
pub const CONNECTOR_RETRY_SCHEDULED: &str = "connector_retry_scheduled";
pub const CONNECTOR_HANDSHAKE_REJECTED: &str = "connector_handshake_rejected";
pub const CONNECTOR_UNEXPECTED_MESSAGE: &str = "connector_unexpected_message";
pub const CONNECTOR_SESSION_CLOSED: &str = "connector_session_closed";

// Federation lifecycle events.
pub const FEDERATION_START: &str = "federation_start";
pub const FEDERATION_STOP: &str = "federation_stop";
