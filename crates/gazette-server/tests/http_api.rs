//! HTTP surface tests over the memory backend.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum_test::TestServer;
use gazette_relay::{
    BrokerConfig, ChangeEvent, ChangeListener, ChannelSource, EventBroker, ListenerMetrics,
    Operation,
};
use gazette_server::{
    create_router, AppState, ListenerStatus, MemoryStore, Newsletter, NewsletterStore,
    ServerConfig, StorageBackend,
};
use serde_json::{json, Value};
use tokio::sync::{broadcast, watch};

fn test_server() -> TestServer {
    test_server_with(EventBroker::new(), ListenerMetrics::default())
}

fn test_server_with(broker: EventBroker, metrics: ListenerMetrics) -> TestServer {
    let store = Arc::new(NewsletterStore::from(MemoryStore::new()));
    let (_status_tx, status_rx) = watch::channel(ListenerStatus::Connected);
    let (shutdown_tx, _) = broadcast::channel(1);
    let state = AppState::new(
        store,
        broker,
        ServerConfig::default().with_storage(StorageBackend::Memory),
        status_rx,
        shutdown_tx,
    )
    .with_listener_metrics(metrics);
    TestServer::new(create_router(state)).unwrap()
}

fn session(username: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("session={username}")).unwrap()
}

#[tokio::test]
async fn login_sets_session_cookie() {
    let server = test_server();

    let response = server
        .post("/auth")
        .json(&json!({"username": "testuser", "password": "testpass"}))
        .await;

    response.assert_status_ok();
    assert_eq!(response.cookie("session").value(), "testuser");
    assert_eq!(
        response.json::<Value>(),
        json!({"message": "Logged in successfully"})
    );
}

#[tokio::test]
async fn login_rejects_unusable_username() {
    let server = test_server();

    let response = server
        .post("/auth")
        .json(&json!({"username": "two words", "password": "x"}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn protected_routes_require_session() {
    let server = test_server();
    let body = json!({"title": "Test Newsletter", "content": "This is a test newsletter"});

    let response = server.post("/newsletters").json(&body).await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let error = response.json::<Value>();
    assert_eq!(error["code"], "UNAUTHORIZED");
    assert_eq!(error["detail"], "Not authenticated");

    server
        .get("/newsletters")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    server
        .put("/newsletters/1")
        .json(&body)
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    server
        .get("/newsletter/events")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_and_list_newsletters() {
    let server = test_server();

    let created = server
        .post("/newsletters")
        .add_header(header::COOKIE, session("demo"))
        .json(&json!({"title": "Test Newsletter", "content": "This is a test newsletter"}))
        .await;
    created.assert_status_ok();
    let created = created.json::<Newsletter>();
    assert_eq!(created.title, "Test Newsletter");
    assert_eq!(created.content, "This is a test newsletter");

    server
        .post("/newsletters")
        .add_header(header::COOKIE, session("demo"))
        .json(&json!({"title": "Second", "content": "newer"}))
        .await
        .assert_status_ok();

    let listed = server
        .get("/newsletters")
        .add_header(header::COOKIE, session("demo"))
        .await;
    listed.assert_status_ok();
    let titles: Vec<String> = listed
        .json::<Vec<Newsletter>>()
        .into_iter()
        .map(|n| n.title)
        .collect();
    assert_eq!(titles, vec!["Second", "Test Newsletter"]);
}

#[tokio::test]
async fn update_newsletter() {
    let server = test_server();

    let created = server
        .post("/newsletters")
        .add_header(header::COOKIE, session("demo"))
        .json(&json!({"title": "Draft", "content": "v1"}))
        .await
        .json::<Newsletter>();

    let response = server
        .put(&format!("/newsletters/{}", created.id))
        .add_header(header::COOKIE, session("demo"))
        .json(&json!({"title": "Final", "content": "v2"}))
        .await;
    response.assert_status_ok();
    assert_eq!(
        response.json::<Value>(),
        json!({"message": "Newsletter updated successfully"})
    );

    let listed = server
        .get("/newsletters")
        .add_header(header::COOKIE, session("demo"))
        .await
        .json::<Vec<Newsletter>>();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, "Final");
    assert_eq!(listed[0].content, "v2");
    assert_eq!(listed[0].created_at, created.created_at);
}

#[tokio::test]
async fn update_missing_newsletter_is_not_found() {
    let server = test_server();

    let response = server
        .put("/newsletters/42")
        .add_header(header::COOKIE, session("demo"))
        .json(&json!({"title": "Nope", "content": ""}))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["detail"], "Newsletter not found");
}

#[tokio::test]
async fn empty_title_is_rejected() {
    let server = test_server();

    server
        .post("/newsletters")
        .add_header(header::COOKIE, session("demo"))
        .json(&json!({"title": "  ", "content": "body"}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_reports_relay_state() {
    let server = test_server();

    let response = server.get("/health").await;
    response.assert_status_ok();

    let health = response.json::<Value>();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["storage"], "memory");
    assert_eq!(health["storage_connected"], true);
    assert_eq!(health["subscribers"], 0);
    assert_eq!(health["listener"], json!({"state": "connected"}));
}

#[tokio::test]
async fn health_reports_skipped_events_per_queue() {
    let broker = EventBroker::with_config(BrokerConfig::default().with_queue_capacity(1));
    let server = test_server_with(broker.clone(), ListenerMetrics::default());

    let stalled = broker.subscribe();
    for id in 1..=3 {
        let record = json!({"id": id});
        broker.publish(ChangeEvent::new(
            Operation::Insert,
            record.as_object().unwrap().clone(),
        ));
    }

    let health = server.get("/health").await.json::<Value>();
    assert_eq!(health["subscribers"], 1);
    assert_eq!(health["events_published"], 3);

    let queue = &health["subscriber_queues"][0];
    assert_eq!(queue["id"], stalled.id().as_u64());
    assert_eq!(queue["delivered"], 1);
    assert_eq!(queue["skipped"], 2);
}

#[tokio::test]
async fn health_reports_listener_counters() {
    let mut listener = ChangeListener::new(EventBroker::new());
    let server = test_server_with(EventBroker::new(), listener.metrics());

    let (notifier, source) = ChannelSource::pair();
    listener.start(source).await.unwrap();
    notifier.notify("{broken");
    notifier.notify(r#"{"operation":"INSERT","id":1}"#);

    tokio::time::timeout(Duration::from_secs(5), async {
        while listener.stats().delivered < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("listener never forwarded the event");

    let health = server.get("/health").await.json::<Value>();
    assert_eq!(
        health["listener_stats"],
        json!({"delivered": 1, "malformed": 1})
    );

    listener.stop().await;
}
