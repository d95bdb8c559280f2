//! Handler tests, calling handlers directly with their extractors.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::http::Request as HttpRequest;
use axum::Json;
use serde_json::{json, Value};
use telebridge_api::handlers::{
    cron_sync_handler, get_device_status_handler, health_handler, list_devices_handler,
    send_command_handler,
};
use telebridge_api::models::{ListDevicesQuery, SendCommandRequest};
use telebridge_api::{create_router, ServerState};
use telebridge_bridge::{BridgeTiming, DeviceBridge};
use telebridge_core::{DeviceRecord, Envelope, Qos, TopicConfig};
use telebridge_mqtt::{MemoryBroker, SessionFactory};
use telebridge_storage::{MemoryStore, SharedStore, StateStore, UnavailableStore};

fn timing() -> BridgeTiming {
    BridgeTiming {
        read_window: Duration::from_millis(60),
        cron_window: Duration::from_millis(80),
        ack_timeout: Duration::from_millis(120),
        sync_on_read: true,
    }
}

fn test_state(broker: &MemoryBroker, store: SharedStore) -> ServerState {
    let bridge = DeviceBridge::new(
        Arc::new(broker.clone()),
        store,
        &TopicConfig::default(),
        timing(),
    );
    ServerState::new(bridge)
}

async fn seed(store: &MemoryStore, record: DeviceRecord) {
    store
        .upsert(Envelope::new("smarthome/data", Qos::AtLeastOnce, record))
        .await
        .unwrap();
}

fn command(
    action: Option<&str>,
    value: Value,
) -> Result<Json<SendCommandRequest>, JsonRejection> {
    Ok(Json(SendCommandRequest {
        action: action.map(str::to_string),
        value,
    }))
}

/// Run a raw body through the same extractor the router uses.
async fn extract_body(
    content_type: Option<&str>,
    body: &'static str,
) -> Result<Json<SendCommandRequest>, JsonRejection> {
    let mut request = HttpRequest::builder().method("POST").uri("/api/devices/lamp1/command");
    if let Some(content_type) = content_type {
        request = request.header(header::CONTENT_TYPE, content_type);
    }
    let request: Request = request.body(Body::from(body)).unwrap();
    Result::<Json<SendCommandRequest>, JsonRejection>::from_request(request, &()).await.unwrap()
}

#[tokio::test]
async fn test_health() {
    let broker = MemoryBroker::default();
    let state = test_state(&broker, Arc::new(MemoryStore::new()));

    let Json(response) = health_handler(State(state)).await.unwrap();
    let health = response.data.unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.store_backend, "memory");
    assert!(health.store_available);
    assert!(broker.client_ids().is_empty());
}

#[tokio::test]
async fn test_health_degraded() {
    let broker = MemoryBroker::default();
    let state = test_state(&broker, Arc::new(UnavailableStore::new("permission denied")));

    let Json(response) = health_handler(State(state)).await.unwrap();
    assert_eq!(response.data.unwrap().status, "degraded");
}

#[tokio::test]
async fn test_list_devices_online_only() {
    let broker = MemoryBroker::default();
    let store = Arc::new(MemoryStore::new());
    seed(&store, DeviceRecord::new("lamp1").with_status(true, "on")).await;
    seed(&store, DeviceRecord::new("lamp2").with_status(false, "off")).await;
    let state = test_state(&broker, store);

    let Json(response) = list_devices_handler(
        State(state.clone()),
        Query(ListDevicesQuery { online_only: true }),
    )
    .await
    .unwrap();
    let devices = response.data.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].device_id, "lamp1");

    let Json(response) = list_devices_handler(State(state), Query(ListDevicesQuery::default()))
        .await
        .unwrap();
    assert_eq!(response.data.unwrap().len(), 2);
}

#[tokio::test]
async fn test_device_status() {
    let broker = MemoryBroker::default();
    let store = Arc::new(MemoryStore::new());
    seed(&store, DeviceRecord::new("lamp1").with_status(true, "on")).await;
    let state = test_state(&broker, store);

    let Json(response) = get_device_status_handler(State(state), Path("lamp1".to_string()))
        .await
        .unwrap();
    let record = response.data.unwrap();
    assert!(record.is_online());
}

#[tokio::test]
async fn test_device_status_not_found() {
    let broker = MemoryBroker::default();
    let state = test_state(&broker, Arc::new(MemoryStore::new()));

    let err = get_device_status_handler(State(state), Path("lamp99".to_string()))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::NOT_FOUND);
    assert_eq!(err.code, "DEVICE_NOT_FOUND");
    assert_eq!(err.message, "Device 'lamp99' not found.");
}

#[tokio::test]
async fn test_command_missing_action() {
    let broker = MemoryBroker::default();
    let state = test_state(&broker, Arc::new(MemoryStore::new()));

    let err = send_command_handler(State(state), Path("lamp1".to_string()), command(None, json!(1)))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::BAD_REQUEST);
    assert_eq!(err.message, "Missing 'action' in request body");
    assert!(broker.published().is_empty());
}

#[tokio::test]
async fn test_command_body_must_be_json() {
    let broker = MemoryBroker::default();
    let state = test_state(&broker, Arc::new(MemoryStore::new()));

    for (content_type, body) in [
        (Some("application/json"), "{not json"),
        (Some("text/plain"), r#"{"action":"turn_on"}"#),
        (None, r#"{"action":"turn_on"}"#),
        (Some("application/json"), "42"),
    ] {
        let extracted = extract_body(content_type, body).await;
        assert!(extracted.is_err(), "body {:?} should be rejected", body);

        let err = send_command_handler(State(state.clone()), Path("lamp1".to_string()), extracted)
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "VALIDATION_FAILED");
        assert_eq!(err.message, "Request must be JSON");
        assert!(err.details.unwrap()["reason"].is_string());
    }
    assert!(broker.client_ids().is_empty());
}

#[tokio::test]
async fn test_command_json_body_extracts() {
    let Json(req) = extract_body(
        Some("application/json"),
        r#"{"action":"turn_on","value":{"brightness":80}}"#,
    )
    .await
    .unwrap();
    assert_eq!(req.action.as_deref(), Some("turn_on"));
    assert_eq!(req.value, json!({"brightness": 80}));
}

#[tokio::test]
async fn test_command_timeout() {
    let broker = MemoryBroker::default();
    let state = test_state(&broker, Arc::new(MemoryStore::new()));

    let err = send_command_handler(
        State(state),
        Path("lamp1".to_string()),
        command(Some("turn_on"), Value::Null),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::REQUEST_TIMEOUT);
    let details = err.details.unwrap();
    assert!(details["command_id"].as_str().unwrap().starts_with("cmd_"));
    assert_eq!(broker.published_on("smarthome/control/lamp1").len(), 1);
}

async fn spawn_responder(broker: &MemoryBroker, success: bool) -> tokio::task::JoinHandle<()> {
    let mut session = broker.open().await.unwrap();
    session
        .subscribe("smarthome/control/lamp1", Qos::AtLeastOnce)
        .await
        .unwrap();
    let mut commands = session.take_messages().unwrap();
    tokio::spawn(async move {
        while let Some(message) = commands.recv().await {
            let command: Value = serde_json::from_slice(&message.payload).unwrap();
            let reply = json!({
                "device_id": "lamp1",
                "status": {"online": true, "text_data": command["action"]},
                "command_ack": {"success": success},
            });
            session
                .publish("smarthome/data", serde_json::to_vec(&reply).unwrap(), Qos::AtLeastOnce)
                .await
                .unwrap();
        }
    })
}

#[tokio::test]
async fn test_command_accepted() {
    let broker = MemoryBroker::default();
    let device = spawn_responder(&broker, true).await;
    let state = test_state(&broker, Arc::new(MemoryStore::new()));

    let Json(response) = send_command_handler(
        State(state),
        Path("lamp1".to_string()),
        command(Some("turn_on"), json!({"brightness": 80})),
    )
    .await
    .unwrap();
    device.abort();

    let data = response.data.unwrap();
    assert_eq!(data.status, "accepted");
    assert_eq!(data.action, "turn_on");
    assert_eq!(data.value, json!({"brightness": 80}));
    assert_eq!(data.device_status.ack_success(), Some(true));
}

#[tokio::test]
async fn test_command_rejected() {
    let broker = MemoryBroker::default();
    let device = spawn_responder(&broker, false).await;
    let state = test_state(&broker, Arc::new(MemoryStore::new()));

    let err = send_command_handler(
        State(state),
        Path("lamp1".to_string()),
        command(Some("turn_on"), Value::Null),
    )
    .await
    .unwrap_err();
    device.abort();

    assert_eq!(err.status, StatusCode::CONFLICT);
    let details = err.details.unwrap();
    assert_eq!(details["device_status"]["command_ack"]["success"], json!(false));
}

#[tokio::test]
async fn test_broker_offline_is_503() {
    let broker = MemoryBroker::default();
    broker.set_offline(true);
    let state = test_state(&broker, Arc::new(MemoryStore::new()));

    let err = list_devices_handler(State(state.clone()), Query(ListDevicesQuery::default()))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(err.code, "BROKER_UNAVAILABLE");

    let err = cron_sync_handler(State(state)).await.unwrap_err();
    assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_store_unavailable_is_503() {
    let broker = MemoryBroker::default();
    let state = test_state(&broker, Arc::new(UnavailableStore::new("KV_URL is not set")));

    let err = get_device_status_handler(State(state), Path("lamp1".to_string()))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(err.code, "STORAGE_UNAVAILABLE");
    assert!(broker.client_ids().is_empty());
}

#[tokio::test]
async fn test_cron_sync_report() {
    let broker = MemoryBroker::default();
    let store = Arc::new(MemoryStore::new());
    let state = test_state(&broker, store.clone());

    let publisher = {
        let broker = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            broker.inject("smarthome/data", br#"{"device_id":"fan1"}"#.to_vec(), Qos::AtLeastOnce);
            broker.inject("smarthome/data", b"oops".to_vec(), Qos::AtLeastOnce);
        })
    };

    let Json(response) = cron_sync_handler(State(state)).await.unwrap();
    publisher.await.unwrap();

    let report = response.data.unwrap();
    assert_eq!(report.received, 2);
    assert_eq!(report.stored, 1);
    assert_eq!(report.decode_errors, 1);
    assert!(store.get("fan1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_router_builds_with_prefixes() {
    let broker = MemoryBroker::default();
    let state = test_state(&broker, Arc::new(MemoryStore::new()));

    let _ = create_router(state.clone(), "/api");
    let _ = create_router(state.clone(), "/api/v1/");
    let _ = create_router(state, "/");
}
