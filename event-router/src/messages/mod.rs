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

//! The closed set of protocol messages.
//!
//! Every message the router sends or receives is one [`Message`] variant.
//! Three variants are synthetic and never appear on the wire: they are
//! injected by the session filters to report decode errors, request
//! timeouts and liveness failures through the same handler path as real
//! messages.

mod client;
mod codes;
mod federation;

pub use client::{
    ConnRply, ConnRqst, Disconn, DisconnRply, DisconnRqst, Nack, NotifyDeliver, NotifyEmit,
    OptionMap, QuenchRqst, SecRply, SecRqst, SubAddRqst, SubDelRqst, SubModRqst, SubRply,
    UNotify,
};
pub use codes::{disconnect, nack};
pub use federation::{Ack, FedConnRply, FedConnRqst, FedNotify, FedSubReplace};

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Client protocol version implemented by the router.
pub const CLIENT_VERSION_MAJOR: i32 = 4;
pub const CLIENT_VERSION_MINOR: i32 = 0;

/// Federation protocol version.
pub const FEDERATION_VERSION_MAJOR: i32 = 1;
pub const FEDERATION_VERSION_MINOR: i32 = 0;

/// Default port for `ewaf:` federation URIs.
pub const DEFAULT_EWAF_PORT: u16 = 2916;

/// A frame that could not be decoded, or a reply that could not be matched.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorMessage {
    pub error: String,
    /// The message that triggered the error, when there is one.
    pub cause: Option<Arc<Message>>,
}

/// A tracked request went unanswered for longer than the request timeout.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestTimeout {
    pub request: Arc<Message>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    UNotify(UNotify),
    Nack(Nack),
    ConnRqst(ConnRqst),
    ConnRply(ConnRply),
    DisconnRqst(DisconnRqst),
    DisconnRply(DisconnRply),
    Disconn(Disconn),
    SecRqst(SecRqst),
    SecRply(SecRply),
    NotifyEmit(NotifyEmit),
    NotifyDeliver(NotifyDeliver),
    SubAddRqst(SubAddRqst),
    SubModRqst(SubModRqst),
    SubDelRqst(SubDelRqst),
    SubRply(SubRply),
    DropWarn,
    TestConn,
    ConfConn,
    QuenchAddRqst(QuenchRqst),
    QuenchModRqst(QuenchRqst),
    QuenchDelRqst(QuenchRqst),
    FedConnRqst(FedConnRqst),
    FedConnRply(FedConnRply),
    FedSubReplace(FedSubReplace),
    FedNotify(FedNotify),
    Ack(Ack),
    Error(ErrorMessage),
    RequestTimeout(RequestTimeout),
    LivenessFailure,
}

impl Message {
    /// Stable type id. Synthetic messages have negative ids.
    pub fn type_id(&self) -> i32 {
        match self {
            Message::UNotify(_) => 32,
            Message::Nack(_) => 48,
            Message::ConnRqst(_) => 49,
            Message::ConnRply(_) => 50,
            Message::DisconnRqst(_) => 51,
            Message::DisconnRply(_) => 52,
            Message::Disconn(_) => 53,
            Message::SecRqst(_) => 54,
            Message::SecRply(_) => 55,
            Message::NotifyEmit(_) => 56,
            Message::NotifyDeliver(_) => 57,
            Message::SubAddRqst(_) => 58,
            Message::SubModRqst(_) => 59,
            Message::SubDelRqst(_) => 60,
            Message::SubRply(_) => 61,
            Message::DropWarn => 62,
            Message::TestConn => 63,
            Message::ConfConn => 64,
            Message::QuenchAddRqst(_) => 80,
            Message::QuenchModRqst(_) => 81,
            Message::QuenchDelRqst(_) => 82,
            Message::FedConnRqst(_) => 192,
            Message::FedConnRply(_) => 193,
            Message::FedSubReplace(_) => 194,
            Message::FedNotify(_) => 195,
            Message::Ack(_) => 196,
            Message::Error(_) => -1,
            Message::RequestTimeout(_) => -2,
            Message::LivenessFailure => -3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Message::UNotify(_) => "UNotify",
            Message::Nack(_) => "Nack",
            Message::ConnRqst(_) => "ConnRqst",
            Message::ConnRply(_) => "ConnRply",
            Message::DisconnRqst(_) => "DisconnRqst",
            Message::DisconnRply(_) => "DisconnRply",
            Message::Disconn(_) => "Disconn",
            Message::SecRqst(_) => "SecRqst",
            Message::SecRply(_) => "SecRply",
            Message::NotifyEmit(_) => "NotifyEmit",
            Message::NotifyDeliver(_) => "NotifyDeliver",
            Message::SubAddRqst(_) => "SubAddRqst",
            Message::SubModRqst(_) => "SubModRqst",
            Message::SubDelRqst(_) => "SubDelRqst",
            Message::SubRply(_) => "SubRply",
            Message::DropWarn => "DropWarn",
            Message::TestConn => "TestConn",
            Message::ConfConn => "ConfConn",
            Message::QuenchAddRqst(_) => "QuenchAddRqst",
            Message::QuenchModRqst(_) => "QuenchModRqst",
            Message::QuenchDelRqst(_) => "QuenchDelRqst",
            Message::FedConnRqst(_) => "FedConnRqst",
            Message::FedConnRply(_) => "FedConnRply",
            Message::FedSubReplace(_) => "FedSubReplace",
            Message::FedNotify(_) => "FedNotify",
            Message::Ack(_) => "Ack",
            Message::Error(_) => "ErrorMessage",
            Message::RequestTimeout(_) => "RequestTimeout",
            Message::LivenessFailure => "LivenessFailure",
        }
    }

    /// Transaction id of a request or reply.
    pub fn xid(&self) -> Option<u32> {
        match self {
            Message::ConnRqst(m) => Some(m.xid),
            Message::ConnRply(m) => Some(m.xid),
            Message::DisconnRqst(m) => Some(m.xid),
            Message::DisconnRply(m) => Some(m.xid),
            Message::SecRqst(m) => Some(m.xid),
            Message::SecRply(m) => Some(m.xid),
            Message::SubAddRqst(m) => Some(m.xid),
            Message::SubModRqst(m) => Some(m.xid),
            Message::SubDelRqst(m) => Some(m.xid),
            Message::SubRply(m) => Some(m.xid),
            Message::Nack(m) => Some(m.xid),
            Message::QuenchAddRqst(m) | Message::QuenchModRqst(m) | Message::QuenchDelRqst(m) => {
                Some(m.xid)
            }
            Message::FedConnRqst(m) => Some(m.xid),
            Message::FedConnRply(m) => Some(m.xid),
            Message::FedSubReplace(m) => Some(m.xid),
            Message::Ack(m) => Some(m.xid),
            _ => None,
        }
    }

    /// True for messages that expect a reply carrying the same xid.
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Message::ConnRqst(_)
                | Message::DisconnRqst(_)
                | Message::SecRqst(_)
                | Message::SubAddRqst(_)
                | Message::SubModRqst(_)
                | Message::SubDelRqst(_)
                | Message::QuenchAddRqst(_)
                | Message::QuenchModRqst(_)
                | Message::QuenchDelRqst(_)
                | Message::FedConnRqst(_)
                | Message::FedSubReplace(_)
        )
    }

    pub fn is_reply(&self) -> bool {
        matches!(
            self,
            Message::ConnRply(_)
                | Message::DisconnRply(_)
                | Message::SecRply(_)
                | Message::SubRply(_)
                | Message::Nack(_)
                | Message::FedConnRply(_)
                | Message::Ack(_)
        )
    }

    /// The request a tracked reply answers.
    pub fn request(&self) -> Option<&Arc<Message>> {
        match self {
            Message::ConnRply(m) => m.request.as_ref(),
            Message::DisconnRply(m) => m.request.as_ref(),
            Message::SecRply(m) => m.request.as_ref(),
            Message::SubRply(m) => m.request.as_ref(),
            Message::Nack(m) => m.request.as_ref(),
            Message::FedConnRply(m) => m.request.as_ref(),
            Message::Ack(m) => m.request.as_ref(),
            Message::RequestTimeout(m) => Some(&m.request),
            _ => None,
        }
    }

    /// Links a reply to the request it answers. No-op for non-replies.
    pub fn attach_request(&mut self, request: Arc<Message>) {
        let slot = match self {
            Message::ConnRply(m) => &mut m.request,
            Message::DisconnRply(m) => &mut m.request,
            Message::SecRply(m) => &mut m.request,
            Message::SubRply(m) => &mut m.request,
            Message::Nack(m) => &mut m.request,
            Message::FedConnRply(m) => &mut m.request,
            Message::Ack(m) => &mut m.request,
            _ => return,
        };
        *slot = Some(request);
    }

    /// A `Nack` answering `request`.
    pub fn nack(request: &Message, error: i32, message: impl Into<String>) -> Message {
        Message::Nack(Nack {
            xid: request.xid().unwrap_or_default(),
            error,
            message: message.into(),
            request: None,
        })
    }

    pub fn ack(request: &Message) -> Message {
        Message::Ack(Ack {
            xid: request.xid().unwrap_or_default(),
            request: None,
        })
    }

    pub fn disconn(reason: i32, args: impl Into<String>) -> Message {
        Message::Disconn(Disconn {
            reason,
            args: args.into(),
        })
    }

    pub fn error(error: impl Into<String>, cause: Option<Arc<Message>>) -> Message {
        Message::Error(ErrorMessage {
            error: error.into(),
            cause,
        })
    }
}

/// Source of request transaction ids. Each owner (a router, a test client)
/// holds its own generator; ids start at 1.
#[derive(Debug)]
pub struct XidGenerator {
    next: AtomicU32,
}

impl XidGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    pub fn next_xid(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for XidGenerator {
    fn default() -> Self {
        Self::new()
    }
}
