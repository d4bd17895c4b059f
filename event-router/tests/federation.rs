mod support;

use event_router::federation::{EwafUri, HANDSHAKE_TIMEOUT};
use event_router::messages::{nack, FedConnRqst, Message, FEDERATION_VERSION_MAJOR};
use event_router::security::Keys;
use event_router::subscription::{attributes, Attributes, Value};
use event_router::transport::SessionHandler;
use integration_test_utils::{init_logging, LoopbackNetwork};
use std::sync::Arc;
use std::time::Duration;
use support::{wait_until, RouterNode};

const QUIET: Duration = Duration::from_secs(1);

const B_LISTENS: &str = r#"{
    "router-name": "B",
    "listen": ["ewaf://b.example.com:2916"],
    "subscribe": { "peers": "require(federated)" },
    "provide": { "peers": "require(federated)" },
    "apply-class": { "peers": ["a.example.com", "c.example.com"] },
    "request-timeout": 2,
    "keepalive-interval": 5,
}"#;

fn connecting(name: &str) -> String {
    format!(
        r#"{{
            "router-name": "{name}",
            "connect": {{ "peers": ["ewaf://b.example.com:2916"] }},
            "subscribe": {{ "peers": "require(federated)" }},
            "provide": {{ "peers": "require(federated)" }},
            "request-timeout": 2,
            "keepalive-interval": 5,
        }}"#
    )
}

async fn ring_member(network: &LoopbackNetwork, name: &str, host: &str, next: &str) -> RouterNode {
    let config = format!(
        r#"{{
            "router-name": "{name}",
            "listen": ["ewaf://{host}:2916"],
            "connect": {{ "peers": ["ewaf://{next}:2916"] }},
            "subscribe": {{ "peers": "require(federated)" }},
            "provide": {{ "peers": "require(federated)" }},
            "apply-class": {{ "peers": ["*.example.com"] }},
            "request-timeout": 2,
        }}"#
    );
    RouterNode::start(network, host, &config).await
}

fn federated_from(origin: &str) -> Attributes {
    attributes([
        ("federated", Value::Int32(1)),
        ("from", Value::from(origin)),
    ])
}

fn sorted(mut routings: Vec<Vec<String>>) -> Vec<Vec<String>> {
    routings.sort();
    routings
}

fn routing(domains: &[&str]) -> Vec<String> {
    domains.iter().map(|domain| domain.to_string()).collect()
}

#[tokio::test(start_paused = true)]
async fn two_routers_exchange_federated_notifications() {
    init_logging();
    let network = LoopbackNetwork::new();
    let b = RouterNode::start(&network, "b.example.com", B_LISTENS).await;
    let a = RouterNode::start(&network, "a.example.com", &connecting("A")).await;
    assert!(wait_until(|| a.links_live(1) && b.links_live(1)).await);

    let mut consumer = b.client().await;
    let id = consumer.subscribe("from == 'A'", true, Keys::new()).await.unwrap();
    let producer = a.client().await;

    producer.emit(federated_from("A"), true, Keys::new());

    let delivered = consumer.next_notification().await.unwrap();
    assert_eq!(delivered.insecure_matches, vec![id]);
    assert!(consumer.next_notification_within(QUIET).await.is_none());
    assert_eq!(b.seen.federated(), vec![routing(&["A"])]);
    assert!(a.seen.federated().is_empty());
}

#[tokio::test(start_paused = true)]
async fn a_link_carries_notifications_both_ways() {
    init_logging();
    let network = LoopbackNetwork::new();
    let b = RouterNode::start(&network, "b.example.com", B_LISTENS).await;
    let a = RouterNode::start(&network, "a.example.com", &connecting("A")).await;
    assert!(wait_until(|| a.links_live(1) && b.links_live(1)).await);

    let mut consumer = a.client().await;
    consumer.subscribe("from == 'B'", true, Keys::new()).await.unwrap();
    let producer = b.client().await;

    producer.emit(federated_from("B"), true, Keys::new());

    assert!(consumer.next_notification().await.is_some());
    assert_eq!(a.seen.federated(), vec![routing(&["B"])]);
}

#[tokio::test(start_paused = true)]
async fn notifications_outside_the_class_stay_local() {
    init_logging();
    let network = LoopbackNetwork::new();
    let b = RouterNode::start(&network, "b.example.com", B_LISTENS).await;
    let a = RouterNode::start(&network, "a.example.com", &connecting("A")).await;
    assert!(wait_until(|| a.links_live(1) && b.links_live(1)).await);

    let mut consumer = b.client().await;
    consumer.subscribe("from == 'A'", true, Keys::new()).await.unwrap();
    let producer = a.client().await;

    producer.emit(attributes([("from", "A")]), true, Keys::new());

    assert!(consumer.next_notification_within(QUIET).await.is_none());
    assert!(b.seen.federated().is_empty());
}

#[tokio::test(start_paused = true)]
async fn line_topology_forwards_once_and_never_back() {
    init_logging();
    let network = LoopbackNetwork::new();
    let b = RouterNode::start(&network, "b.example.com", B_LISTENS).await;
    let a = RouterNode::start(&network, "a.example.com", &connecting("A")).await;
    let c = RouterNode::start(&network, "c.example.com", &connecting("C")).await;
    assert!(wait_until(|| a.links_live(1) && b.links_live(2) && c.links_live(1)).await);

    let mut far = c.client().await;
    far.subscribe("from == 'A'", true, Keys::new()).await.unwrap();
    let mut local = a.client().await;
    local.subscribe("from == 'A'", true, Keys::new()).await.unwrap();
    let producer = a.client().await;

    producer.emit(federated_from("A"), true, Keys::new());

    assert!(far.next_notification().await.is_some());
    assert!(far.next_notification_within(QUIET).await.is_none());
    assert!(local.next_notification().await.is_some());
    assert!(local.next_notification_within(QUIET).await.is_none());

    assert_eq!(b.seen.federated(), vec![routing(&["A"])]);
    assert_eq!(c.seen.federated(), vec![routing(&["B", "A"])]);
    assert!(a.seen.federated().is_empty());
}

#[tokio::test(start_paused = true)]
async fn ring_topology_terminates() {
    init_logging();
    let network = LoopbackNetwork::new();
    let a = ring_member(&network, "A", "a.example.com", "b.example.com").await;
    let b = ring_member(&network, "B", "b.example.com", "c.example.com").await;
    let c = ring_member(&network, "C", "c.example.com", "a.example.com").await;
    assert!(wait_until(|| a.links_live(2) && b.links_live(2) && c.links_live(2)).await);

    let producer = a.client().await;
    producer.emit(federated_from("A"), true, Keys::new());
    tokio::time::sleep(QUIET).await;

    assert!(a.seen.federated().is_empty());
    assert_eq!(
        sorted(b.seen.federated()),
        vec![routing(&["A"]), routing(&["C", "A"])]
    );
    assert_eq!(
        sorted(c.seen.federated()),
        vec![routing(&["A"]), routing(&["B", "A"])]
    );
    for node in [&a, &b, &c] {
        for path in node.seen.federated() {
            let mut unique = path.clone();
            unique.sort();
            unique.dedup();
            assert_eq!(unique.len(), path.len(), "domain repeated in {path:?}");
        }
    }
}

#[tokio::test(start_paused = true)]
async fn unknown_host_is_refused_and_retried() {
    init_logging();
    let network = LoopbackNetwork::new();
    let b = RouterNode::start(
        &network,
        "b.example.com",
        r#"{
            "router-name": "B",
            "listen": ["ewaf://b.example.com:2916"],
            "subscribe": { "peers": "require(federated)" },
            "apply-class": { "peers": ["trusted.example.com"] },
        }"#,
    )
    .await;
    let a = RouterNode::start(&network, "a.example.com", &connecting("A")).await;
    let connector = a.federation.connectors()[0].clone();

    assert!(wait_until(|| connector.is_waiting_to_retry()).await);
    assert!(!connector.is_connected());
    assert!(b.federation.acceptor().unwrap().links().is_empty());
}

#[tokio::test(start_paused = true)]
async fn acceptor_rejects_bad_handshakes() {
    init_logging();
    let network = LoopbackNetwork::new();
    let b = RouterNode::start(&network, "b.example.com", B_LISTENS).await;
    let acceptor: Arc<dyn SessionHandler> = b.federation.acceptor().unwrap().clone();

    let mut future_version = network.connect_client("a.example.com", acceptor.clone());
    let xid = future_version.next_xid();
    let reply = future_version
        .request(Message::FedConnRqst(FedConnRqst {
            xid,
            version_major: FEDERATION_VERSION_MAJOR + 1,
            version_minor: 0,
            server_domain: "A".to_string(),
        }))
        .await;
    match reply {
        Some(Message::Nack(rejection)) => assert_eq!(rejection.error, nack::PROT_INCOMPAT),
        other => panic!("expected Nack, got {other:?}"),
    }

    let mut impostor = network.connect_client("a.example.com", acceptor.clone());
    let xid = impostor.next_xid();
    let reply = impostor
        .request(Message::FedConnRqst(FedConnRqst {
            xid,
            version_major: FEDERATION_VERSION_MAJOR,
            version_minor: 0,
            server_domain: "b".to_string(),
        }))
        .await;
    match reply {
        Some(Message::Nack(rejection)) => {
            assert_eq!(rejection.error, nack::INVALID_DOMAIN);
            assert_eq!(rejection.message, "Server domain is the same as the remote router's");
        }
        other => panic!("expected Nack, got {other:?}"),
    }

    let mut stranger = network.connect_client("stranger.example.org", acceptor);
    let xid = stranger.next_xid();
    let reply = stranger
        .request(Message::FedConnRqst(FedConnRqst {
            xid,
            version_major: FEDERATION_VERSION_MAJOR,
            version_minor: 0,
            server_domain: "S".to_string(),
        }))
        .await;
    match reply {
        Some(Message::Nack(rejection)) => {
            assert_eq!(rejection.error, nack::INVALID_DOMAIN);
            assert_eq!(rejection.message, "No federation import/export allowed for host");
        }
        other => panic!("expected Nack, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn silent_handshake_is_dropped_after_timeout() {
    init_logging();
    let network = LoopbackNetwork::new();
    let b = RouterNode::start(&network, "b.example.com", B_LISTENS).await;
    let acceptor: Arc<dyn SessionHandler> = b.federation.acceptor().unwrap().clone();
    let started = tokio::time::Instant::now();

    let mut idle = network.connect_client("a.example.com", acceptor);

    assert!(idle.next_message_within(HANDSHAKE_TIMEOUT * 2).await.is_none());
    assert!(idle.is_closed());
    assert!(started.elapsed() >= HANDSHAKE_TIMEOUT);
}

#[tokio::test(start_paused = true)]
async fn connector_retries_until_the_remote_listens() {
    init_logging();
    let network = LoopbackNetwork::new();
    let a = RouterNode::start(&network, "a.example.com", &connecting("A")).await;
    let connector = a.federation.connectors()[0].clone();
    assert!(wait_until(|| connector.is_waiting_to_retry()).await);

    let b = RouterNode::start(&network, "b.example.com", B_LISTENS).await;

    assert!(wait_until(|| a.links_live(1) && b.links_live(1)).await);
    assert!(connector.is_connected());
}

#[tokio::test(start_paused = true)]
async fn unresponsive_federator_is_disconnected_then_reconnected() {
    init_logging();
    let network = LoopbackNetwork::new();
    let b = RouterNode::start(&network, "b.example.com", B_LISTENS).await;
    let a = RouterNode::start(&network, "a.example.com", &connecting("A")).await;
    assert!(wait_until(|| a.links_live(1) && b.links_live(1)).await);
    let connector = a.federation.connectors()[0].clone();
    let first_link = connector.link().unwrap();

    b.transport.set_silent(true);

    assert!(wait_until(|| first_link.is_closed()).await);
    assert!(wait_until(|| b.federation.acceptor().unwrap().links().is_empty()).await);
    assert!(!connector.is_connected());

    b.transport.set_silent(false);

    assert!(wait_until(|| a.links_live(1) && b.links_live(1)).await);
    let second_link = connector.link().unwrap();
    assert!(!Arc::ptr_eq(&first_link, &second_link));
}

#[tokio::test(start_paused = true)]
async fn unanswered_connect_request_times_out() {
    init_logging();
    let network = LoopbackNetwork::new();
    let b = RouterNode::start(&network, "b.example.com", B_LISTENS).await;
    b.transport.set_silent(true);
    let a = RouterNode::start(&network, "a.example.com", &connecting("A")).await;
    let connector = a.federation.connectors()[0].clone();

    // The handshake request times out after the two second request timeout.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(connector.is_waiting_to_retry());
    assert!(connector.link().is_none());

    b.transport.set_silent(false);
    assert!(wait_until(|| connector.is_connected()).await);
}

#[tokio::test(start_paused = true)]
async fn closing_federation_drops_links_on_both_sides() {
    init_logging();
    let network = LoopbackNetwork::new();
    let b = RouterNode::start(&network, "b.example.com", B_LISTENS).await;
    let a = RouterNode::start(&network, "a.example.com", &connecting("A")).await;
    assert!(wait_until(|| a.links_live(1) && b.links_live(1)).await);
    let connector = a.federation.connectors()[0].clone();
    let link = connector.link().unwrap();

    a.shutdown();

    assert!(connector.is_closing());
    assert!(link.is_closed());
    assert!(wait_until(|| b.federation.acceptor().unwrap().links().is_empty()).await);

    b.shutdown();
    let uri: EwafUri = "ewaf://b.example.com:2916".parse().unwrap();
    assert!(wait_until(|| !network.is_listening(&uri)).await);
}
