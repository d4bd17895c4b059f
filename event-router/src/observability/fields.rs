/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/


//! Canonical structured field keys and value-format helpers.

pub const EVENT: &str = "event";
pub const COMPONENT: &str = "component";
pub const SESSION_ID: &str = "session_id";
pub const REMOTE: &str = "remote";

pub const XID: &str = "xid";
pub const MSG_TYPE: &str = "msg_type";
pub const SUBSCRIPTION_ID: &str = "subscription_id";
pub const SERVER_DOMAIN: &str = "server_domain";
pub const REMOTE_DOMAIN: &str = "remote_domain";
pub const CLASS_NAME: &str = "class_name";
pub const ROUTING: &str = "routing";
pub const URI: &str = "uri";

pub const REASON: &str = "reason";
pub const ERR: &str = "err";

pub const NONE: &str = "none";
pub const REASON_UNKNOWN_XID: &str = "unknown_xid";
pub const REASON_LIMIT_EXCEEDED: &str = "limit_exceeded";
pub const REASON_NO_SUCH_SUBSCRIPTION: &str = "no_such_subscription";
pub const REASON_DOMAIN_REJECTED: &str = "domain_rejected";
pub const REASON_PROTOCOL_INCOMPATIBLE: &str = "protocol_incompatible";
pub const REASON_ROUTING_LOOP: &str = "routing_loop";
pub const REASON_CLOSED_WITHOUT_WARNING: &str = "closed_without_warning";

/// Comma-separated routing path, or [`NONE`] for an empty path.
pub fn format_routing(routing: &[String]) -> String {
    if routing.is_empty() {
        NONE.to_string()
    } else {
        routing.join(",")
    }
}

pub fn format_subscription_ids(ids: &[u64]) -> String {
    if ids.is_empty() {
        return NONE.to_string();
    }
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
