mod support;

use event_router::messages::{disconnect, nack, Message};
use event_router::router::{ConnectionOptions, Router, SUBSCRIPTION_MAX_LENGTH};
use event_router::security::Keys;
use event_router::subscription::{attributes, Value};
use integration_test_utils::{init_logging, LoopbackNetwork, TestClient};
use std::sync::Arc;
use std::time::Duration;
use support::{consumer_keys, producer_keys, wait_until};

const QUIET: Duration = Duration::from_secs(1);

async fn connected_client(network: &LoopbackNetwork, router: &Arc<Router>) -> TestClient {
    let mut client = network.connect_client("client.example.com", router.clone());
    let reply = client.connect().await;
    assert!(matches!(reply, Some(Message::ConnRply(_))), "got {reply:?}");
    client
}

fn router() -> Arc<Router> {
    Arc::new(Router::new(ConnectionOptions::default()).unwrap())
}

#[tokio::test(start_paused = true)]
async fn insecure_publish_matches_insecure_subscription() {
    init_logging();
    let network = LoopbackNetwork::new();
    let router = router();
    let mut consumer = connected_client(&network, &router).await;
    let producer = connected_client(&network, &router).await;

    let id = consumer
        .subscribe("number == 1", true, Keys::new())
        .await
        .unwrap();
    producer.emit(attributes([("number", 1)]), true, Keys::new());

    let delivered = consumer.next_notification().await.unwrap();
    assert_eq!(delivered.insecure_matches, vec![id]);
    assert!(delivered.secure_matches.is_empty());
    assert_eq!(delivered.attributes["number"], Value::Int32(1));
    assert!(consumer.next_notification_within(QUIET).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn keyed_subscription_needs_producer_keys() {
    init_logging();
    let network = LoopbackNetwork::new();
    let router = router();
    let mut consumer = connected_client(&network, &router).await;
    let producer = connected_client(&network, &router).await;

    let id = consumer
        .subscribe("require(From-Alice)", false, consumer_keys("alice"))
        .await
        .unwrap();

    producer.emit(attributes([("From-Alice", 1)]), true, Keys::new());
    assert!(consumer.next_notification_within(QUIET).await.is_none());

    producer.emit(attributes([("From-Alice", 1)]), true, producer_keys("mallory"));
    assert!(consumer.next_notification_within(QUIET).await.is_none());

    producer.emit(attributes([("From-Alice", 1)]), true, producer_keys("alice"));
    let delivered = consumer.next_notification().await.unwrap();
    assert_eq!(delivered.secure_matches, vec![id]);
    assert!(delivered.insecure_matches.is_empty());
}

#[tokio::test(start_paused = true)]
async fn connection_keys_cover_every_subscription() {
    init_logging();
    let network = LoopbackNetwork::new();
    let router = router();

    let mut consumer = network.connect_client("consumer.example.com", router.clone());
    consumer
        .connect_with(Default::default(), Keys::new(), consumer_keys("alice"))
        .await
        .unwrap();
    let mut producer = network.connect_client("producer.example.com", router.clone());
    producer
        .connect_with(Default::default(), producer_keys("alice"), Keys::new())
        .await
        .unwrap();

    let id = consumer.subscribe("require(x)", false, Keys::new()).await.unwrap();
    producer.emit(attributes([("x", "y")]), false, Keys::new());

    let delivered = consumer.next_notification().await.unwrap();
    assert_eq!(delivered.secure_matches, vec![id]);
}

#[tokio::test(start_paused = true)]
async fn subscription_at_max_length_is_accepted() {
    init_logging();
    let network = LoopbackNetwork::new();
    let router = router();
    let mut client = connected_client(&network, &router).await;
    let max = router.options().subscription_max_length as usize;

    // `require(aaa...)` padded out to exactly the limit.
    let at_limit = format!("require({})", "a".repeat(max - "require()".len()));
    assert_eq!(at_limit.chars().count(), max);
    assert!(client.subscribe(&at_limit, true, Keys::new()).await.is_ok());

    // One over is refused before parsing, even though it is garbage.
    let over = format!("require({}", "(".repeat(max - "require(".len() + 1));
    let err = client.subscribe(&over, true, Keys::new()).await.unwrap_err();
    assert_eq!(err.error, nack::IMPL_LIMIT);
}

#[tokio::test(start_paused = true)]
async fn negotiated_max_length_applies_to_the_connection() {
    init_logging();
    let network = LoopbackNetwork::new();
    let router = router();
    let mut client = network.connect_client("client.example.com", router.clone());

    let mut options = event_router::messages::OptionMap::new();
    options.insert(SUBSCRIPTION_MAX_LENGTH.to_string(), Value::Int32(1024));
    let Some(Message::ConnRply(reply)) = client
        .connect_with(options, Keys::new(), Keys::new())
        .await
    else {
        panic!("expected ConnRply");
    };
    assert_eq!(reply.options[SUBSCRIPTION_MAX_LENGTH], Value::Int32(1024));

    let over = format!("require({})", "a".repeat(1024));
    let err = client.subscribe(&over, true, Keys::new()).await.unwrap_err();
    assert_eq!(err.error, nack::IMPL_LIMIT);
}

#[tokio::test(start_paused = true)]
async fn bad_subscriptions_are_nacked() {
    init_logging();
    let network = LoopbackNetwork::new();
    let router = router();
    let mut client = connected_client(&network, &router).await;

    let err = client.subscribe("number ==", true, Keys::new()).await.unwrap_err();
    assert_eq!(err.error, nack::PARSE_ERROR);

    let err = client.subscribe("1 == 1", true, Keys::new()).await.unwrap_err();
    assert_eq!(err.error, nack::EXP_IS_TRIVIAL);

    let err = client.unsubscribe(999).await.unwrap_err();
    assert_eq!(err.error, nack::NO_SUCH_SUB);
}

#[tokio::test(start_paused = true)]
async fn deeply_nested_subscription_is_nacked_and_the_session_survives() {
    init_logging();
    let network = LoopbackNetwork::new();
    let router = router();
    let mut client = connected_client(&network, &router).await;
    let nested = format!("{}require(x){}", "(".repeat(1019), ")".repeat(1019));

    let err = client.subscribe(&nested, true, Keys::new()).await.unwrap_err();
    assert_eq!(err.error, nack::PARSE_ERROR);

    let id = client.subscribe("require(x)", true, Keys::new()).await.unwrap();
    let err = client.modify_subscription(id, &nested, true).await.unwrap_err();
    assert_eq!(err.error, nack::PARSE_ERROR);
    assert_eq!(router.session_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn modify_and_delete_change_what_is_delivered() {
    init_logging();
    let network = LoopbackNetwork::new();
    let router = router();
    let mut consumer = connected_client(&network, &router).await;
    let producer = connected_client(&network, &router).await;

    let id = consumer.subscribe("n == 1", true, Keys::new()).await.unwrap();
    assert_eq!(consumer.modify_subscription(id, "n == 2", true).await, Ok(id));

    producer.emit(attributes([("n", 1)]), true, Keys::new());
    assert!(consumer.next_notification_within(QUIET).await.is_none());

    producer.emit(attributes([("n", 2)]), true, Keys::new());
    assert_eq!(consumer.next_notification().await.unwrap().insecure_matches, vec![id]);

    assert_eq!(consumer.unsubscribe(id).await, Ok(id));
    producer.emit(attributes([("n", 2)]), true, Keys::new());
    assert!(consumer.next_notification_within(QUIET).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn request_before_connect_is_a_protocol_violation() {
    init_logging();
    let network = LoopbackNetwork::new();
    let router = router();
    let mut client = network.connect_client("client.example.com", router.clone());

    assert!(client.subscribe("require(x)", true, Keys::new()).await.is_err());

    match client.next_message().await {
        Some(Message::Disconn(disconn)) => {
            assert_eq!(disconn.reason, disconnect::PROTOCOL_VIOLATION)
        }
        other => panic!("expected Disconn, got {other:?}"),
    }
    assert!(client.next_message().await.is_none());
    assert!(wait_until(|| router.session_count() == 0).await);
}

#[tokio::test(start_paused = true)]
async fn disconnect_request_is_acknowledged() {
    init_logging();
    let network = LoopbackNetwork::new();
    let router = router();
    let mut client = connected_client(&network, &router).await;
    assert_eq!(router.session_count(), 1);

    let reply = client.disconnect().await;

    assert!(matches!(reply, Some(Message::DisconnRply(_))), "got {reply:?}");
    assert!(client.next_message().await.is_none());
    assert!(wait_until(|| router.session_count() == 0).await);
}

#[tokio::test(start_paused = true)]
async fn router_close_disconnects_clients() {
    init_logging();
    let network = LoopbackNetwork::new();
    let router = router();
    let mut client = connected_client(&network, &router).await;

    router.close();

    match client.next_message().await {
        Some(Message::Disconn(disconn)) => assert_eq!(disconn.reason, disconnect::SHUTDOWN),
        other => panic!("expected Disconn, got {other:?}"),
    }
    assert!(client.next_message().await.is_none());
}
