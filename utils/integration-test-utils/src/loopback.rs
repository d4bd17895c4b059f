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


//! An in-process network of paired sessions.
//!
//! Every session runs a pump task that feeds its handler one event at a
//! time, in order. `close` lets the peer drain everything sent before it,
//! so a `Disconn` followed by `close` is always seen by the other side.

use async_trait::async_trait;
use event_router::federation::EwafUri;
use event_router::messages::Message;
use event_router::transport::{
    DialError, FederationTransport, ListenError, RemoteAddress, Session, SessionAttributes,
    SessionError, SessionHandler, SessionId,
};
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

enum Event {
    Message(Message),
    PeerClosed,
    Closed,
}

/// State shared by every session opened from one host.
struct Host {
    name: String,
    silent: AtomicBool,
    next_port: AtomicU16,
}

impl Host {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            silent: AtomicBool::new(false),
            next_port: AtomicU16::new(40000),
        })
    }

    fn ephemeral_address(&self) -> RemoteAddress {
        RemoteAddress::new(self.name.clone(), self.next_port.fetch_add(1, Ordering::Relaxed))
    }
}

/// One end of a loopback connection.
pub struct LoopbackSession {
    id: SessionId,
    host: Arc<Host>,
    remote_address: RemoteAddress,
    attributes: SessionAttributes,
    connected: AtomicBool,
    idle_timeout: Mutex<Option<Duration>>,
    inbox: UnboundedSender<Event>,
    peer: UnboundedSender<Event>,
    sent: AtomicU64,
}

impl LoopbackSession {
    /// Messages handed to the peer so far.
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::SeqCst)
    }
}

impl Session for LoopbackSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn send(&self, message: Message) -> Result<(), SessionError> {
        if !self.is_connected() {
            return Err(SessionError::Closed(self.id));
        }
        if self.host.silent.load(Ordering::SeqCst) {
            trace!(host = %self.host.name, msg_type = message.name(), "silent host dropped message");
            return Ok(());
        }

        self.peer
            .unbounded_send(Event::Message(message))
            .map_err(|_| SessionError::Closed(self.id))?;
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            let _ = self.peer.unbounded_send(Event::PeerClosed);
            let _ = self.inbox.unbounded_send(Event::Closed);
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn set_idle_timeout(&self, timeout: Option<Duration>) {
        *self.idle_timeout.lock() = timeout;
    }

    fn remote_address(&self) -> &RemoteAddress {
        &self.remote_address
    }

    fn attributes(&self) -> &SessionAttributes {
        &self.attributes
    }
}

async fn pump(
    session: Arc<LoopbackSession>,
    handler: Arc<dyn SessionHandler>,
    mut inbox: UnboundedReceiver<Event>,
) {
    let as_dyn: Arc<dyn Session> = session.clone();

    loop {
        let idle_timeout = *session.idle_timeout.lock();
        let event = match idle_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, inbox.next()).await {
                Ok(event) => event,
                Err(_) => {
                    handler.session_idle(&as_dyn);
                    continue;
                }
            },
            None => inbox.next().await,
        };

        match event {
            Some(Event::Message(message)) => {
                if session.is_connected() {
                    handler.message_received(&as_dyn, message);
                }
            }
            Some(Event::PeerClosed) => {
                session.connected.store(false, Ordering::SeqCst);
                break;
            }
            Some(Event::Closed) | None => break,
        }
    }

    handler.session_closed(&as_dyn);
}

/// Creates a connected pair. Each side's handler sees `session_opened`
/// (server first) before any message is pumped.
fn open_pair(
    client_host: Arc<Host>,
    client_handler: Arc<dyn SessionHandler>,
    server_host: Arc<Host>,
    server_address: RemoteAddress,
    server_handler: Arc<dyn SessionHandler>,
) -> (Arc<LoopbackSession>, Arc<LoopbackSession>) {
    let (client_tx, client_rx) = unbounded();
    let (server_tx, server_rx) = unbounded();

    let client_address = client_host.ephemeral_address();
    let client = Arc::new(LoopbackSession {
        id: SessionId::new(),
        host: client_host,
        remote_address: server_address,
        attributes: SessionAttributes::new(),
        connected: AtomicBool::new(true),
        idle_timeout: Mutex::new(None),
        inbox: client_tx.clone(),
        peer: server_tx.clone(),
        sent: AtomicU64::new(0),
    });
    let server = Arc::new(LoopbackSession {
        id: SessionId::new(),
        host: server_host,
        remote_address: client_address,
        attributes: SessionAttributes::new(),
        connected: AtomicBool::new(true),
        idle_timeout: Mutex::new(None),
        inbox: server_tx,
        peer: client_tx,
        sent: AtomicU64::new(0),
    });

    let server_dyn: Arc<dyn Session> = server.clone();
    let client_dyn: Arc<dyn Session> = client.clone();
    server_handler.session_opened(&server_dyn);
    client_handler.session_opened(&client_dyn);

    tokio::spawn(pump(server.clone(), server_handler, server_rx));
    tokio::spawn(pump(client.clone(), client_handler, client_rx));

    (client, server)
}

struct Listener {
    host: Arc<Host>,
    handler: Arc<dyn SessionHandler>,
}

/// Hosts and listening endpoints, keyed by lower-case host name and port.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    listeners: Arc<Mutex<HashMap<(String, u16), Listener>>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// A federation transport whose sessions originate from `host_name`.
    pub fn transport(&self, host_name: &str) -> Arc<LoopbackTransport> {
        Arc::new(LoopbackTransport {
            network: self.clone(),
            host: Host::new(host_name),
        })
    }

    /// Opens a client connection from `client_host` to `server`, typically
    /// a router.
    pub fn connect_client(
        &self,
        client_host: &str,
        server: Arc<dyn SessionHandler>,
    ) -> crate::TestClient {
        let (handler, inbox) = crate::test_client::ClientInbox::new();
        let (client, _server) = open_pair(
            Host::new(client_host),
            handler,
            Host::new("router"),
            RemoteAddress::new("router", 2917),
            server,
        );
        crate::TestClient::new(client, inbox)
    }

    pub fn is_listening(&self, uri: &EwafUri) -> bool {
        self.listeners.lock().contains_key(&key(uri))
    }
}

fn key(uri: &EwafUri) -> (String, u16) {
    (uri.host.to_lowercase(), uri.port)
}

/// One host's view of a [`LoopbackNetwork`].
pub struct LoopbackTransport {
    network: LoopbackNetwork,
    host: Arc<Host>,
}

impl LoopbackTransport {
    pub fn host_name(&self) -> &str {
        &self.host.name
    }

    /// While silent, everything this host sends is dropped without
    /// closing any session, as if the host had hung.
    pub fn set_silent(&self, silent: bool) {
        self.host.silent.store(silent, Ordering::SeqCst);
    }
}

#[async_trait]
impl FederationTransport for LoopbackTransport {
    async fn dial(
        &self,
        uri: &EwafUri,
        handler: Arc<dyn SessionHandler>,
    ) -> Result<Arc<dyn Session>, DialError> {
        let (server_host, server_handler) = {
            let listeners = self.network.listeners.lock();
            let listener = listeners
                .get(&key(uri))
                .ok_or_else(|| DialError::Refused(uri.clone()))?;
            (listener.host.clone(), listener.handler.clone())
        };

        let (client, _server) = open_pair(
            self.host.clone(),
            handler,
            server_host,
            RemoteAddress::new(uri.host.clone(), uri.port),
            server_handler,
        );
        let client: Arc<dyn Session> = client;
        Ok(client)
    }

    async fn listen(&self, uri: &EwafUri, handler: Arc<dyn SessionHandler>) -> Result<(), ListenError> {
        let mut listeners = self.network.listeners.lock();
        let key = key(uri);
        if listeners.contains_key(&key) {
            return Err(ListenError::AddressInUse(uri.clone()));
        }
        listeners.insert(
            key,
            Listener {
                host: self.host.clone(),
                handler,
            },
        );
        Ok(())
    }

    async fn unlisten(&self, uri: &EwafUri) {
        self.network.listeners.lock().remove(&key(uri));
    }
}
