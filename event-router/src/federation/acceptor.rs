//! Accepts incoming federation sessions and runs the server side of the
//! handshake.

use super::{same_domain, EwafUri, FederationClass, FederationClasses, FederationTimeouts, Link};
use crate::messages::{
    nack, FedConnRply, FedConnRqst, Message, XidGenerator, FEDERATION_VERSION_MAJOR,
    FEDERATION_VERSION_MINOR,
};
use crate::observability::{events, fields};
use crate::router::Router;
use crate::runtime::{ScheduledTask, Scheduler};
use crate::transport::{FederationTransport, ListenError, Session, SessionHandler, SessionId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{info, warn};

const COMPONENT: &str = "acceptor";

/// A connecting federator must send `FedConnRqst` within this period.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);

struct PendingHandshake {
    session: Arc<dyn Session>,
    timer: ScheduledTask,
}

pub struct Acceptor {
    router: Arc<Router>,
    server_domain: String,
    classes: Arc<FederationClasses>,
    transport: Arc<dyn FederationTransport>,
    scheduler: Scheduler,
    listen_uris: Vec<EwafUri>,
    xids: Arc<XidGenerator>,
    links: Mutex<HashMap<SessionId, Arc<Link>>>,
    handshakes: Mutex<HashMap<SessionId, PendingHandshake>>,
    closing: AtomicBool,
    this: Weak<Acceptor>,
}

impl Acceptor {
    fn new(
        router: Arc<Router>,
        server_domain: String,
        classes: Arc<FederationClasses>,
        listen_uris: Vec<EwafUri>,
        transport: Arc<dyn FederationTransport>,
        scheduler: Scheduler,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            router,
            server_domain,
            classes,
            transport,
            scheduler,
            listen_uris,
            xids: Arc::new(XidGenerator::new()),
            links: Mutex::new(HashMap::new()),
            handshakes: Mutex::new(HashMap::new()),
            closing: AtomicBool::new(false),
            this: this.clone(),
        })
    }

    /// Starts listening on every URI in `listen_uris`. If any of them
    /// cannot be bound, the ones already bound are released again.
    pub async fn bind(
        router: Arc<Router>,
        server_domain: impl Into<String>,
        classes: Arc<FederationClasses>,
        listen_uris: Vec<EwafUri>,
        transport: Arc<dyn FederationTransport>,
        scheduler: Scheduler,
        timeouts: FederationTimeouts,
    ) -> Result<Arc<Self>, ListenError> {
        let acceptor = Self::new(
            router,
            server_domain.into(),
            classes,
            listen_uris,
            transport,
            scheduler,
        );

        for (index, uri) in acceptor.listen_uris.iter().enumerate() {
            let handler = timeouts.session_filters(acceptor.clone(), &acceptor.scheduler);

            if let Err(err) = acceptor.transport.listen(uri, handler).await {
                warn!(
                    event = events::ACCEPTOR_LISTEN_FAILED,
                    component = COMPONENT,
                    uri = %uri,
                    err = %err,
                    "cannot listen for federation links"
                );
                for bound in &acceptor.listen_uris[..index] {
                    acceptor.transport.unlisten(bound).await;
                }
                return Err(err);
            }

            info!(
                event = events::ACCEPTOR_LISTEN_OK,
                component = COMPONENT,
                uri = %uri,
                server_domain = %acceptor.server_domain,
                "federator listening"
            );
        }

        Ok(acceptor)
    }

    pub fn listen_uris(&self) -> &[EwafUri] {
        &self.listen_uris
    }

    /// Links established through this acceptor and still registered.
    pub fn links(&self) -> Vec<Arc<Link>> {
        self.links.lock().values().cloned().collect()
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Closes every link and pending handshake, then stops listening in the
    /// background. Idempotent.
    pub fn close(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }

        let links: Vec<_> = self.links.lock().drain().map(|(_, link)| link).collect();
        for link in links {
            link.close();
        }

        let pending: Vec<_> = self.handshakes.lock().drain().map(|(_, p)| p).collect();
        for handshake in pending {
            handshake.timer.cancel();
            handshake.session.close();
        }

        let transport = self.transport.clone();
        let uris = self.listen_uris.clone();
        self.scheduler.spawn(async move {
            for uri in &uris {
                transport.unlisten(uri).await;
            }
        });
    }

    fn link_for(&self, session_id: SessionId) -> Option<Arc<Link>> {
        self.links.lock().get(&session_id).cloned()
    }

    fn finish_handshake(&self, session_id: SessionId) {
        if let Some(pending) = self.handshakes.lock().remove(&session_id) {
            pending.timer.cancel();
        }
    }

    fn handle_handshake(&self, session: &Arc<dyn Session>, message: Message) {
        match message {
            Message::FedConnRqst(request) => {
                self.finish_handshake(session.id());
                self.handle_fed_conn_rqst(session, request);
            }
            Message::Error(error) => {
                warn!(
                    event = events::ACCEPTOR_UNEXPECTED_MESSAGE,
                    component = COMPONENT,
                    session_id = %session.id(),
                    remote = %session.remote_address(),
                    err = %error.error,
                    "error during federation handshake, disconnecting"
                );
                session.close();
            }
            other => {
                warn!(
                    event = events::ACCEPTOR_UNEXPECTED_MESSAGE,
                    component = COMPONENT,
                    session_id = %session.id(),
                    remote = %session.remote_address(),
                    msg_type = other.name(),
                    "unexpected handshake message from connecting federator, disconnecting"
                );
                session.close();
            }
        }
    }

    fn handle_fed_conn_rqst(&self, session: &Arc<dyn Session>, request: FedConnRqst) {
        if request.version_major != FEDERATION_VERSION_MAJOR
            || request.version_minor > FEDERATION_VERSION_MINOR
        {
            let text = format!(
                "Incompatible federation protocol version: {}.{} not compatible with this federator's {}.{}",
                request.version_major,
                request.version_minor,
                FEDERATION_VERSION_MAJOR,
                FEDERATION_VERSION_MINOR
            );
            self.reject(
                session,
                &request,
                nack::PROT_INCOMPAT,
                fields::REASON_PROTOCOL_INCOMPATIBLE,
                &text,
            );
            return;
        }

        let address = session.remote_address();
        let federation_class = self.classes.class_for(address);
        let remote_host_name = address
            .resolved_host_name
            .clone()
            .unwrap_or_else(|| address.host_name.clone());

        let mut links = self.links.lock();

        let domain_in_use = links
            .values()
            .any(|link| same_domain(link.remote_server_domain(), &request.server_domain));

        let rejection = if domain_in_use {
            Some(format!("Server domain {} already in use", request.server_domain))
        } else if federation_class.allows_nothing() {
            Some("No federation import/export allowed for host".to_string())
        } else if same_domain(&request.server_domain, &self.server_domain) {
            Some("Server domain is the same as the remote router's".to_string())
        } else {
            None
        };

        if let Some(text) = rejection {
            drop(links);
            self.reject(
                session,
                &request,
                nack::INVALID_DOMAIN,
                fields::REASON_DOMAIN_REJECTED,
                &text,
            );
            return;
        }

        if let Err(err) = session.send(Message::FedConnRply(FedConnRply {
            xid: request.xid,
            server_domain: self.server_domain.clone(),
            request: None,
        })) {
            warn!(
                event = events::ACCEPTOR_HANDSHAKE_REJECTED,
                component = COMPONENT,
                session_id = %session.id(),
                err = %err,
                "cannot reply to federation connect request"
            );
            return;
        }

        let link = self.create_link(session, federation_class, request.server_domain, remote_host_name);
        links.insert(session.id(), link);
    }

    fn create_link(
        &self,
        session: &Arc<dyn Session>,
        federation_class: Arc<FederationClass>,
        remote_server_domain: String,
        remote_host_name: String,
    ) -> Arc<Link> {
        info!(
            event = events::LINK_ESTABLISHED,
            component = COMPONENT,
            session_id = %session.id(),
            remote = %session.remote_address(),
            remote_domain = %remote_server_domain,
            class_name = %federation_class.name,
            "federation incoming link established"
        );

        Link::new(
            self.router.clone(),
            session.clone(),
            federation_class,
            self.server_domain.clone(),
            remote_server_domain,
            remote_host_name,
            self.xids.clone(),
        )
    }

    fn reject(
        &self,
        session: &Arc<dyn Session>,
        request: &FedConnRqst,
        code: i32,
        reason: &'static str,
        text: &str,
    ) {
        warn!(
            event = events::ACCEPTOR_HANDSHAKE_REJECTED,
            component = COMPONENT,
            session_id = %session.id(),
            remote = %session.remote_address(),
            remote_domain = %request.server_domain,
            reason,
            "remote federator denied connection: {text}"
        );

        let _ = session.send(Message::nack(
            &Message::FedConnRqst(request.clone()),
            code,
            text,
        ));
        session.close();
    }
}

impl SessionHandler for Acceptor {
    fn session_opened(&self, session: &Arc<dyn Session>) {
        if self.is_closing() {
            session.close();
            return;
        }

        let acceptor = self.this.clone();
        let pending = session.clone();
        let timer = self.scheduler.schedule(HANDSHAKE_TIMEOUT, move || {
            let Some(acceptor) = acceptor.upgrade() else {
                return;
            };
            if acceptor.handshakes.lock().remove(&pending.id()).is_none() {
                return;
            }
            warn!(
                event = events::ACCEPTOR_HANDSHAKE_TIMEOUT,
                component = COMPONENT,
                session_id = %pending.id(),
                remote = %pending.remote_address(),
                "no federation connect request received, disconnecting"
            );
            pending.close();
        });

        self.handshakes.lock().insert(
            session.id(),
            PendingHandshake {
                session: session.clone(),
                timer,
            },
        );
    }

    fn message_received(&self, session: &Arc<dyn Session>, message: Message) {
        if self.is_closing() {
            return;
        }

        match self.link_for(session.id()) {
            Some(link) => link.handle_message(message),
            None => self.handle_handshake(session, message),
        }
    }

    fn session_closed(&self, session: &Arc<dyn Session>) {
        self.finish_handshake(session.id());

        let Some(link) = self.links.lock().remove(&session.id()) else {
            return;
        };

        if link.is_closed() {
            info!(
                event = events::ACCEPTOR_LINK_SESSION_CLOSED,
                component = COMPONENT,
                session_id = %session.id(),
                remote_domain = %link.remote_server_domain(),
                "federation link disconnected"
            );
        } else {
            warn!(
                event = events::ACCEPTOR_LINK_SESSION_CLOSED,
                component = COMPONENT,
                session_id = %session.id(),
                remote_domain = %link.remote_server_domain(),
                reason = fields::REASON_CLOSED_WITHOUT_WARNING,
                "remote host closed incoming federation link with no warning"
            );
            link.close();
        }
    }
}
