#![allow(dead_code)]

use event_router::federation::{FederationManager, FederationOptions};
use event_router::router::{ConnectionOptions, Notification, NotifyListener, Router};
use event_router::runtime::Scheduler;
use event_router::security::{Key, KeyScheme, Keys, Role};
use integration_test_utils::{LoopbackNetwork, LoopbackTransport, TestClient};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// A router with its federation layer, reachable on a loopback network.
pub(crate) struct RouterNode {
    pub(crate) router: Arc<Router>,
    pub(crate) federation: FederationManager,
    pub(crate) transport: Arc<LoopbackTransport>,
    pub(crate) seen: Arc<RecordingListener>,
    network: LoopbackNetwork,
}

impl RouterNode {
    /// Starts a router on `host`, configured from a json5 federation block.
    pub(crate) async fn start(network: &LoopbackNetwork, host: &str, federation: &str) -> Self {
        let options: FederationOptions =
            json5::from_str(federation).expect("federation options should parse");
        let router = Arc::new(
            Router::new(ConnectionOptions::default()).expect("default options are valid"),
        );
        let seen = Arc::new(RecordingListener::default());
        router.add_notify_listener(seen.clone());

        let transport = network.transport(host);
        let federation = FederationManager::new(
            router.clone(),
            &options,
            transport.clone(),
            Scheduler::current().expect("tests run inside tokio"),
        )
        .await
        .expect("federation should start");

        Self {
            router,
            federation,
            transport,
            seen,
            network: network.clone(),
        }
    }

    pub(crate) async fn client(&self) -> TestClient {
        let mut client = self.network.connect_client("client.example.com", self.router.clone());
        let reply = client.connect().await;
        assert!(
            matches!(reply, Some(event_router::messages::Message::ConnRply(_))),
            "connect failed: {reply:?}"
        );
        client
    }

    /// True when every link of this node, in either direction, is live.
    pub(crate) fn links_live(&self, expected: usize) -> bool {
        let incoming = self
            .federation
            .acceptor()
            .map(|acceptor| acceptor.links())
            .unwrap_or_default();
        let outgoing: Vec<_> = self
            .federation
            .connectors()
            .iter()
            .filter_map(|connector| connector.link())
            .collect();

        let links: Vec<_> = incoming.into_iter().chain(outgoing).collect();
        links.len() == expected && links.iter().all(|link| link.is_live() && !link.is_closed())
    }

    pub(crate) fn shutdown(&self) {
        self.federation.close();
        self.router.close();
    }
}

/// Records the routing list of every notification a router delivers.
#[derive(Default)]
pub(crate) struct RecordingListener {
    routings: Mutex<Vec<Vec<String>>>,
}

impl RecordingListener {
    pub(crate) fn routings(&self) -> Vec<Vec<String>> {
        self.routings.lock().clone()
    }

    /// Routing lists of notifications that arrived over federation.
    pub(crate) fn federated(&self) -> Vec<Vec<String>> {
        self.routings()
            .into_iter()
            .filter(|routing| !routing.is_empty())
            .collect()
    }
}

impl NotifyListener for RecordingListener {
    fn notify_received(&self, notification: &Notification, _keys: &Keys) {
        self.routings.lock().push(notification.routing.clone());
    }
}

/// Polls `condition` on the paused test clock, for at most 30 seconds of
/// test time.
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..600 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    condition()
}

/// Keys a producer attaches: the private key, hashed by the router.
pub(crate) fn producer_keys(password: &str) -> Keys {
    let mut keys = Keys::new();
    keys.add(KeyScheme::Sha1Producer, Key::from_password(password).unwrap())
        .unwrap();
    keys
}

/// Keys a consumer attaches to receive from the holder of `password`.
pub(crate) fn consumer_keys(password: &str) -> Keys {
    let mut keys = Keys::new();
    keys.add(
        KeyScheme::Sha1Producer,
        Key::from_password(password).unwrap().public_key(),
    )
    .unwrap();
    keys
}

/// Producer keys as the router stores them after hashing.
pub(crate) fn hashed_producer_keys(password: &str) -> Keys {
    let mut keys = producer_keys(password);
    keys.hash_private_keys_for_role(Role::Producer);
    keys
}

pub(crate) const PEER_CLASS: &str = "require(federated)";
