//! A scripted client speaking the client protocol over a loopback session.

use crate::loopback::LoopbackSession;
use event_router::messages::{
    ConnRqst, DisconnRqst, Message, Nack, NotifyDeliver, NotifyEmit, OptionMap, SubAddRqst,
    SubDelRqst, SubModRqst, XidGenerator, CLIENT_VERSION_MAJOR, CLIENT_VERSION_MINOR,
};
use event_router::security::Keys;
use event_router::subscription::Attributes;
use event_router::transport::{Session, SessionError, SessionHandler};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// How long a client waits for an expected message.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);

pub(crate) enum ClientEvent {
    Message(Message),
    Closed,
}

/// Forwards everything the router sends into the client's queue.
pub(crate) struct ClientInbox {
    tx: mpsc::UnboundedSender<ClientEvent>,
}

impl ClientInbox {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl SessionHandler for ClientInbox {
    fn message_received(&self, _session: &Arc<dyn Session>, message: Message) {
        let _ = self.tx.send(ClientEvent::Message(message));
    }

    fn session_closed(&self, _session: &Arc<dyn Session>) {
        let _ = self.tx.send(ClientEvent::Closed);
    }
}

pub struct TestClient {
    session: Arc<LoopbackSession>,
    inbox: mpsc::UnboundedReceiver<ClientEvent>,
    /// Messages skipped while waiting for something else.
    pending: VecDeque<Message>,
    closed: bool,
    xids: XidGenerator,
}

impl TestClient {
    pub(crate) fn new(session: Arc<LoopbackSession>, inbox: mpsc::UnboundedReceiver<ClientEvent>) -> Self {
        Self {
            session,
            inbox,
            pending: VecDeque::new(),
            closed: false,
            xids: XidGenerator::new(),
        }
    }

    pub fn session(&self) -> Arc<dyn Session> {
        self.session.clone()
    }

    pub fn next_xid(&self) -> u32 {
        self.xids.next_xid()
    }

    pub fn send(&self, message: Message) -> Result<(), SessionError> {
        self.session.send(message)
    }

    pub fn close(&self) {
        self.session.close();
    }

    /// True once the router side has closed the session and every message
    /// before the close has been read.
    pub fn is_closed(&self) -> bool {
        self.closed && self.pending.is_empty()
    }

    /// The next message from the router, waiting at most `wait`.
    pub async fn next_message_within(&mut self, wait: Duration) -> Option<Message> {
        if let Some(message) = self.pending.pop_front() {
            return Some(message);
        }
        if self.closed {
            return None;
        }

        match tokio::time::timeout(wait, self.inbox.recv()).await {
            Ok(Some(ClientEvent::Message(message))) => Some(message),
            Ok(Some(ClientEvent::Closed)) | Ok(None) => {
                self.closed = true;
                None
            }
            Err(_) => None,
        }
    }

    pub async fn next_message(&mut self) -> Option<Message> {
        self.next_message_within(DEFAULT_WAIT).await
    }

    /// Sends `request` and waits for the reply with the same xid. Other
    /// messages received meanwhile stay queued.
    pub async fn request(&mut self, request: Message) -> Option<Message> {
        let xid = request.xid();
        self.send(request).ok()?;

        let mut skipped = Vec::new();
        let reply = loop {
            match self.next_message().await {
                Some(message) if message.is_reply() && message.xid() == xid => break Some(message),
                Some(other) => skipped.push(other),
                None => break None,
            }
        };
        self.pending.extend(skipped);
        reply
    }

    pub async fn connect(&mut self) -> Option<Message> {
        self.connect_with(OptionMap::new(), Keys::new(), Keys::new()).await
    }

    pub async fn connect_with(
        &mut self,
        options: OptionMap,
        notification_keys: Keys,
        subscription_keys: Keys,
    ) -> Option<Message> {
        let xid = self.next_xid();
        self.request(Message::ConnRqst(ConnRqst {
            xid,
            version_major: CLIENT_VERSION_MAJOR,
            version_minor: CLIENT_VERSION_MINOR,
            options,
            notification_keys,
            subscription_keys,
        }))
        .await
    }

    /// Adds a subscription and returns its id, or the router's `Nack`.
    pub async fn subscribe(&mut self, expr: &str, accept_insecure: bool, keys: Keys) -> Result<u64, Nack> {
        let xid = self.next_xid();
        let reply = self
            .request(Message::SubAddRqst(SubAddRqst {
                xid,
                subscription_expr: expr.to_string(),
                accept_insecure,
                keys,
            }))
            .await;
        subscription_reply(reply)
    }

    pub async fn modify_subscription(
        &mut self,
        subscription_id: u64,
        expr: &str,
        accept_insecure: bool,
    ) -> Result<u64, Nack> {
        let xid = self.next_xid();
        let reply = self
            .request(Message::SubModRqst(SubModRqst {
                xid,
                subscription_id,
                subscription_expr: expr.to_string(),
                accept_insecure,
                add_keys: Keys::new(),
                del_keys: Keys::new(),
            }))
            .await;
        subscription_reply(reply)
    }

    pub async fn unsubscribe(&mut self, subscription_id: u64) -> Result<u64, Nack> {
        let xid = self.next_xid();
        let reply = self
            .request(Message::SubDelRqst(SubDelRqst {
                xid,
                subscription_id,
            }))
            .await;
        subscription_reply(reply)
    }

    pub async fn disconnect(&mut self) -> Option<Message> {
        let xid = self.next_xid();
        self.request(Message::DisconnRqst(DisconnRqst { xid })).await
    }

    pub fn emit(&self, attributes: Attributes, deliver_insecure: bool, keys: Keys) {
        let _ = self.send(Message::NotifyEmit(NotifyEmit {
            attributes,
            deliver_insecure,
            keys,
        }));
    }

    /// The next `NotifyDeliver` within `wait`. Other messages are dropped.
    pub async fn next_notification_within(&mut self, wait: Duration) -> Option<NotifyDeliver> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match self.next_message_within(remaining).await? {
                Message::NotifyDeliver(notification) => return Some(notification),
                _ => continue,
            }
        }
    }

    pub async fn next_notification(&mut self) -> Option<NotifyDeliver> {
        self.next_notification_within(DEFAULT_WAIT).await
    }
}

fn subscription_reply(reply: Option<Message>) -> Result<u64, Nack> {
    match reply {
        Some(Message::SubRply(reply)) => Ok(reply.subscription_id),
        Some(Message::Nack(nack)) => Err(nack),
        other => Err(Nack {
            xid: 0,
            error: -1,
            message: format!("no subscription reply: {other:?}"),
            request: None,
        }),
    }
}
