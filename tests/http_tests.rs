// HTTP API tests, driving the router in-process

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{eventually, RecordingPublisher, ScriptedConnector};
use intercom_relay::{
    create_router, AppState, DeviceInfo, RelayFacade, SessionConfig, StaticDirectory,
};
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    connector: Arc<ScriptedConnector>,
}

fn app() -> TestApp {
    let connector = ScriptedConnector::new();
    let publisher = RecordingPublisher::new();
    let relay = RelayFacade::new(
        Arc::clone(&connector) as _,
        publisher as _,
        SessionConfig::default(),
    );
    let directory = StaticDirectory::new(vec![
        DeviceInfo {
            device_id: "f3a1".to_string(),
            name: "Front Door".to_string(),
            entity_id: "switch.front_door_intercom".to_string(),
        },
        DeviceInfo {
            device_id: "9c2e".to_string(),
            name: "Porch Light".to_string(),
            entity_id: "light.porch".to_string(),
        },
    ]);

    TestApp {
        router: create_router(AppState::new(relay, Arc::new(directory))),
        connector,
    }
}

async fn call(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, value)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = app();
    let response = app.router.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_start_then_stats_then_stop() {
    let app = app();

    let (status, body) = call(
        &app.router,
        post("/intercom/start", json!({"device_id": "f3a1", "host": "10.0.0.5"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, stats) = call(&app.router, get("/intercom/sessions/f3a1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["device_id"], "f3a1");
    assert_eq!(stats["state"], "active");
    assert_eq!(stats["port"], 6054);

    let (status, body) = call(
        &app.router,
        post("/intercom/stop", json!({"device_id": "f3a1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(app.connector.link(0).is_disconnected());

    let (status, body) = call(&app.router, get("/intercom/sessions/f3a1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn test_start_failure_maps_to_bad_gateway() {
    let app = app();
    app.connector.fail_connect.store(true, Ordering::SeqCst);

    let (status, body) = call(
        &app.router,
        post("/intercom/start", json!({"device_id": "f3a1", "host": "10.0.0.5"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "connection_failed");
    assert!(body["message"].as_str().unwrap().contains("10.0.0.5"));
}

#[tokio::test]
async fn test_stop_without_session_succeeds() {
    let app = app();

    let (status, body) = call(
        &app.router,
        post("/intercom/stop", json!({"device_id": "unknown"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn test_audio_is_accepted_and_forwarded() {
    let app = app();
    call(
        &app.router,
        post("/intercom/start", json!({"device_id": "f3a1", "host": "10.0.0.5"})),
    )
    .await;

    // "aGVsbG8=" is "hello"
    let (status, _) = call(
        &app.router,
        post("/intercom/audio", json!({"device_id": "f3a1", "audio": "aGVsbG8="})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let link = app.connector.link(0);
    assert!(eventually(|| link.writes().len() == 1).await);
    assert_eq!(link.writes()[0].as_ref(), b"hello");
}

#[tokio::test]
async fn test_audio_for_unknown_device_still_accepted() {
    let app = app();

    let (status, _) = call(
        &app.router,
        post("/intercom/audio", json!({"device_id": "ghost", "audio": "aGVsbG8="})),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(app.connector.connects(), 0);
}

#[tokio::test]
async fn test_devices_lists_only_intercoms() {
    let app = app();

    let (status, body) = call(&app.router, get("/intercom/devices")).await;

    assert_eq!(status, StatusCode::OK);
    let devices = body["devices"].as_array().unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0]["device_id"], "f3a1");
    assert_eq!(devices[0]["name"], "Front Door");
    assert_eq!(devices[0]["entity_id"], "switch.front_door_intercom");
}

#[tokio::test]
async fn test_malformed_start_request_rejected() {
    let app = app();

    let (status, _) = call(
        &app.router,
        post("/intercom/start", json!({"device_id": "f3a1"})),
    )
    .await;

    assert!(status.is_client_error());
    assert_eq!(app.connector.connects(), 0);
}
