//! Behaviour every backend must share.
//!
//! Tests include:
//! - Last-write-wins replacement without field merge
//! - Idempotent point reads
//! - Concurrent upserts to the same and to different devices

use std::sync::Arc;

use serde_json::json;
use telebridge_core::{DeviceRecord, Envelope, Qos};
use telebridge_storage::{LogStore, MemoryStore, RedbStore, SharedStore};
use tempfile::TempDir;

fn backends() -> (TempDir, Vec<SharedStore>) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let stores: Vec<SharedStore> = vec![
        Arc::new(MemoryStore::new()),
        Arc::new(RedbStore::open(dir.path().join("devices.redb")).expect("Failed to open redb")),
        Arc::new(LogStore::open(dir.path().join("devices.jsonl")).expect("Failed to open log")),
    ];
    (dir, stores)
}

fn telemetry(value: serde_json::Value) -> Envelope {
    let record: DeviceRecord = serde_json::from_value(value).expect("valid record");
    Envelope::new("smarthome/data", Qos::AtLeastOnce, record)
}

#[tokio::test]
async fn test_last_write_wins_without_merge() {
    let (_dir, stores) = backends();

    for store in stores {
        store
            .upsert(telemetry(json!({
                "device_id": "lamp1",
                "device_description": "Living room lamp",
                "status": {"online": true, "text_data": "on"}
            })))
            .await
            .unwrap();

        let second = json!({
            "device_id": "lamp1",
            "status": {"online": false}
        });
        store.upsert(telemetry(second.clone())).await.unwrap();

        let current = store.get("lamp1").await.unwrap().expect("record exists");
        assert_eq!(
            serde_json::to_value(&current.record).unwrap(),
            second,
            "backend {} merged records",
            store.backend_name()
        );
    }
}

#[tokio::test]
async fn test_repeated_reads_identical() {
    let (_dir, stores) = backends();

    for store in stores {
        store
            .upsert(telemetry(json!({
                "device_id": "sensor1",
                "timestamp": "2024-05-01T10:00:00Z",
                "status": {"online": true, "text_data": "21.5C"},
                "battery": 87
            })))
            .await
            .unwrap();

        let first = store.get("sensor1").await.unwrap();
        let second = store.get("sensor1").await.unwrap();
        assert_eq!(first, second, "backend {}", store.backend_name());
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }
}

#[tokio::test]
async fn test_unknown_device_is_none() {
    let (_dir, stores) = backends();

    for store in stores {
        assert!(store.get("lamp99").await.unwrap().is_none());
        assert!(store.list().await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_concurrent_upserts_never_corrupt() {
    let (_dir, stores) = backends();

    for store in stores {
        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let device = if i % 2 == 0 { "shared" } else { "other" };
                store
                    .upsert(telemetry(json!({
                        "device_id": device,
                        "status": {"online": true, "text_data": format!("report-{}", i)}
                    })))
                    .await
            }));
        }
        for result in futures::future::join_all(handles).await {
            result.unwrap().unwrap();
        }

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 2, "backend {}", store.backend_name());
        for envelope in all {
            let text = envelope
                .record
                .status
                .and_then(|s| s.text_data)
                .expect("complete record");
            assert!(text.starts_with("report-"));
        }
    }
}
