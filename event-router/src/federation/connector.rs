//! Dials a remote federator and keeps the outgoing link alive.
//!
//! A [`Connector`] owns one outgoing link. Whenever the dial fails, the
//! handshake is rejected or times out, or the session later closes, it
//! schedules another attempt after the request timeout. Only
//! [`Connector::close`] stops it.

use super::{EwafUri, FederationClass, FederationTimeouts, Link};
use crate::messages::{
    FedConnRqst, Message, XidGenerator, FEDERATION_VERSION_MAJOR, FEDERATION_VERSION_MINOR,
};
use crate::observability::events;
use crate::router::Router;
use crate::runtime::{ScheduledTask, Scheduler};
use crate::transport::{FederationTransport, Session, SessionHandler};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

const COMPONENT: &str = "connector";

#[derive(Default)]
struct ConnectorState {
    session: Option<Arc<dyn Session>>,
    link: Option<Arc<Link>>,
    retry: Option<ScheduledTask>,
}

pub struct Connector {
    router: Arc<Router>,
    server_domain: String,
    uri: EwafUri,
    federation_class: Arc<FederationClass>,
    transport: Arc<dyn FederationTransport>,
    scheduler: Scheduler,
    timeouts: FederationTimeouts,
    xids: Arc<XidGenerator>,
    state: Mutex<ConnectorState>,
    closing: AtomicBool,
    this: Weak<Connector>,
}

impl Connector {
    /// Creates the connector and starts the first connection attempt in the
    /// background.
    pub fn start(
        router: Arc<Router>,
        server_domain: impl Into<String>,
        uri: EwafUri,
        federation_class: Arc<FederationClass>,
        transport: Arc<dyn FederationTransport>,
        scheduler: Scheduler,
        timeouts: FederationTimeouts,
    ) -> Arc<Self> {
        let connector = Arc::new_cyclic(|this| Self {
            router,
            server_domain: server_domain.into(),
            uri,
            federation_class,
            transport,
            scheduler,
            timeouts,
            xids: Arc::new(XidGenerator::new()),
            state: Mutex::new(ConnectorState::default()),
            closing: AtomicBool::new(false),
            this: this.clone(),
        });

        connector.connect();
        connector
    }

    pub fn uri(&self) -> &EwafUri {
        &self.uri
    }

    /// The current link, once the handshake has completed.
    pub fn link(&self) -> Option<Arc<Link>> {
        self.state.lock().link.clone()
    }

    /// True when a link is up and the remote has accepted its subscription.
    pub fn is_connected(&self) -> bool {
        self.link()
            .is_some_and(|link| !link.is_closed() && link.is_live())
    }

    pub fn is_waiting_to_retry(&self) -> bool {
        self.state.lock().retry.is_some()
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Stops reconnecting and disconnects the current link, if any.
    /// Idempotent.
    pub fn close(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(retry) = self.state.lock().retry.take() {
            retry.cancel();
        }
        self.disconnect();
    }

    fn connect(&self) {
        if self.is_closing() {
            return;
        }
        let Some(this) = self.this.upgrade() else {
            return;
        };

        if let Some(retry) = self.state.lock().retry.take() {
            retry.cancel();
        }

        info!(
            event = events::CONNECTOR_CONNECT_START,
            component = COMPONENT,
            uri = %self.uri,
            "connecting to remote federator"
        );

        let handler = self.timeouts.session_filters(this.clone(), &self.scheduler);
        self.scheduler.spawn(async move {
            if let Err(err) = this.transport.dial(&this.uri, handler).await {
                if this.is_closing() {
                    return;
                }
                debug!(
                    event = events::CONNECTOR_CONNECT_FAILED,
                    component = COMPONENT,
                    uri = %this.uri,
                    err = %err,
                    "failed to connect to remote federator, retrying"
                );
                this.schedule_retry();
            }
        });
    }

    fn schedule_retry(&self) {
        if self.is_closing() {
            return;
        }

        let mut state = self.state.lock();
        if state.retry.is_some() {
            return;
        }

        debug!(
            event = events::CONNECTOR_RETRY_SCHEDULED,
            component = COMPONENT,
            uri = %self.uri,
            delay_secs = self.timeouts.request_timeout.as_secs(),
            "scheduling reconnection for outgoing federation link"
        );

        let connector = self.this.clone();
        state.retry = Some(self.scheduler.schedule(self.timeouts.request_timeout, move || {
            if let Some(connector) = connector.upgrade() {
                connector.state.lock().retry = None;
                connector.connect();
            }
        }));
    }

    /// Drops the current session and link, closing whichever is still
    /// open.
    fn disconnect(&self) {
        let (session, link) = {
            let mut state = self.state.lock();
            (state.session.take(), state.link.take())
        };

        let Some(session) = session else {
            return;
        };

        if session.is_connected() {
            match link {
                Some(link) => link.close(),
                None => session.close(),
            }
        } else if let Some(link) = link {
            if !link.initiated_session_close() {
                warn!(
                    event = events::CONNECTOR_SESSION_CLOSED,
                    component = COMPONENT,
                    uri = %self.uri,
                    remote_domain = %link.remote_server_domain(),
                    "remote federator closed outgoing link with no warning"
                );
            }
            link.close();
        }
    }

    fn reopen(&self) {
        if self.is_closing() {
            return;
        }
        self.disconnect();
        self.schedule_retry();
    }

    fn is_current(&self, session: &Arc<dyn Session>) -> bool {
        self.state
            .lock()
            .session
            .as_ref()
            .is_some_and(|current| current.id() == session.id())
    }

    fn handle_handshake(&self, session: &Arc<dyn Session>, message: Message) {
        match message {
            Message::FedConnRply(reply) => {
                info!(
                    event = events::LINK_ESTABLISHED,
                    component = COMPONENT,
                    uri = %self.uri,
                    remote = %session.remote_address(),
                    remote_domain = %reply.server_domain,
                    class_name = %self.federation_class.name,
                    "federation outgoing link established"
                );
                let link = Link::new(
                    self.router.clone(),
                    session.clone(),
                    self.federation_class.clone(),
                    self.server_domain.clone(),
                    reply.server_domain,
                    self.uri.host.clone(),
                    self.xids.clone(),
                );
                self.state.lock().link = Some(link);
            }
            Message::Nack(nack) => {
                warn!(
                    event = events::CONNECTOR_HANDSHAKE_REJECTED,
                    component = COMPONENT,
                    uri = %self.uri,
                    code = nack.error,
                    err = %nack.message,
                    "remote federator rejected federation connect request"
                );
                self.reopen();
            }
            Message::RequestTimeout(timeout) => {
                warn!(
                    event = events::REQUEST_TIMEOUT,
                    component = COMPONENT,
                    uri = %self.uri,
                    msg_type = timeout.request.name(),
                    "federation connection request timed out, reconnecting"
                );
                self.reopen();
            }
            Message::Error(error) => {
                warn!(
                    event = events::CONNECTOR_UNEXPECTED_MESSAGE,
                    component = COMPONENT,
                    uri = %self.uri,
                    err = %error.error,
                    "error during federation handshake, reconnecting"
                );
                self.reopen();
            }
            other => {
                warn!(
                    event = events::CONNECTOR_UNEXPECTED_MESSAGE,
                    component = COMPONENT,
                    uri = %self.uri,
                    msg_type = other.name(),
                    "unexpected message during handshake, reconnecting"
                );
                self.reopen();
            }
        }
    }
}

impl SessionHandler for Connector {
    fn session_opened(&self, session: &Arc<dyn Session>) {
        if self.is_closing() {
            session.close();
            return;
        }

        {
            let mut state = self.state.lock();
            if let Some(retry) = state.retry.take() {
                retry.cancel();
            }
            state.session = Some(session.clone());
            state.link = None;
        }

        let request = Message::FedConnRqst(FedConnRqst {
            xid: self.xids.next_xid(),
            version_major: FEDERATION_VERSION_MAJOR,
            version_minor: FEDERATION_VERSION_MINOR,
            server_domain: self.server_domain.clone(),
        });

        if let Err(err) = session.send(request) {
            debug!(
                event = events::CONNECTOR_CONNECT_FAILED,
                component = COMPONENT,
                uri = %self.uri,
                err = %err,
                "cannot send federation connect request"
            );
            self.reopen();
        }
    }

    fn message_received(&self, session: &Arc<dyn Session>, message: Message) {
        if self.is_closing() || !self.is_current(session) {
            return;
        }

        match self.link() {
            Some(link) => {
                if !link.is_closed() {
                    link.handle_message(message);
                }
            }
            None => self.handle_handshake(session, message),
        }
    }

    fn session_closed(&self, session: &Arc<dyn Session>) {
        if !self.is_current(session) {
            return;
        }

        info!(
            event = events::CONNECTOR_SESSION_CLOSED,
            component = COMPONENT,
            uri = %self.uri,
            session_id = %session.id(),
            "federation link disconnected"
        );
        self.reopen();
    }
}
