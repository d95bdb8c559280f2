//! The bridge over the persistent backends: state written by one process
//! is served by the next.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use telebridge_bridge::{BridgeTiming, DeviceBridge};
use telebridge_core::{Qos, StorageBackendKind, StorageConfig, TopicConfig};
use telebridge_mqtt::MemoryBroker;
use telebridge_storage::try_open_store;
use tempfile::TempDir;

fn timing(sync_on_read: bool) -> BridgeTiming {
    BridgeTiming {
        read_window: Duration::from_millis(50),
        cron_window: Duration::from_millis(120),
        ack_timeout: Duration::from_millis(100),
        sync_on_read,
    }
}

fn bridge(broker: &MemoryBroker, config: &StorageConfig, sync_on_read: bool) -> DeviceBridge {
    let store = try_open_store(config).unwrap();
    DeviceBridge::new(
        Arc::new(broker.clone()),
        store,
        &TopicConfig::default(),
        timing(sync_on_read),
    )
}

async fn sync_two_reports(broker: &MemoryBroker, bridge: &DeviceBridge) {
    let publisher = {
        let broker = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            broker.inject(
                "smarthome/data",
                br#"{"device_id":"lamp1","status":{"online":true,"text_data":"on"}}"#.to_vec(),
                Qos::AtLeastOnce,
            );
            broker.inject(
                "smarthome/data",
                br#"{"device_id":"lamp1","status":{"online":false,"text_data":"off"}}"#.to_vec(),
                Qos::AtLeastOnce,
            );
        })
    };
    let report = bridge.run_cron_sync().await.unwrap();
    publisher.await.unwrap();
    assert_eq!(report.stored, 2);
}

async fn assert_survives_restart(backend: StorageBackendKind, file: &str) {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig {
        backend,
        path: Some(dir.path().join(file).to_string_lossy().into_owned()),
    };
    let broker = MemoryBroker::default();

    {
        let first = bridge(&broker, &config, true);
        sync_two_reports(&broker, &first).await;
    }

    let second = bridge(&broker, &config, false);
    let record = second.get_device_status("lamp1").await.unwrap();
    assert!(!record.is_online());
    assert_eq!(record.status.unwrap().text_data.as_deref(), Some("off"));

    let devices = second.list_devices(true).await.unwrap();
    assert!(devices.is_empty());
}

#[tokio::test]
async fn test_log_backend_survives_restart() {
    assert_survives_restart(StorageBackendKind::Log, "device_data_log.jsonl").await;
}

#[tokio::test]
async fn test_redb_backend_survives_restart() {
    assert_survives_restart(StorageBackendKind::Redb, "devices.redb").await;
}

#[tokio::test]
async fn test_log_lines_carry_receipt_metadata() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("log.jsonl");
    let config = StorageConfig {
        backend: StorageBackendKind::Log,
        path: Some(path.to_string_lossy().into_owned()),
    };
    let broker = MemoryBroker::default();
    let bridge = bridge(&broker, &config, true);

    sync_two_reports(&broker, &bridge).await;

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<Value> = content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    for line in &lines {
        assert_eq!(line["device_id"], "lamp1");
        assert_eq!(line["topic"], "smarthome/data");
        assert_eq!(line["qos"], 1);
        assert!(line["received_at"].is_string());
    }
    assert_eq!(lines[1]["device_data"]["status"]["text_data"], "off");
}
