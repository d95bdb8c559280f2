//! In-process state store.

use async_trait::async_trait;
use dashmap::DashMap;
use telebridge_core::Envelope;

use crate::{Result, StateStore};

/// Process-local store backed by a sharded concurrent map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    devices: DashMap<String, Envelope>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of known devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn upsert(&self, envelope: Envelope) -> Result<()> {
        self.devices.insert(envelope.device_id.clone(), envelope);
        Ok(())
    }

    async fn get(&self, device_id: &str) -> Result<Option<Envelope>> {
        Ok(self.devices.get(device_id).map(|entry| entry.value().clone()))
    }

    async fn list(&self) -> Result<Vec<Envelope>> {
        let mut envelopes: Vec<Envelope> = self
            .devices
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        envelopes.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        Ok(envelopes)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telebridge_core::{DeviceRecord, Qos};

    fn envelope(record: DeviceRecord) -> Envelope {
        Envelope::new("smarthome/data", Qos::AtLeastOnce, record)
    }

    #[tokio::test]
    async fn test_upsert_replaces_whole_record() {
        let store = MemoryStore::new();
        let mut first = DeviceRecord::new("lamp1").with_status(true, "on");
        first.device_description = Some("Desk lamp".to_string());
        store.upsert(envelope(first)).await.unwrap();

        let second = DeviceRecord::new("lamp1").with_status(false, "off");
        store.upsert(envelope(second.clone())).await.unwrap();

        let current = store.get("lamp1").await.unwrap().unwrap();
        assert_eq!(current.record, second);
        assert_eq!(current.record.device_description, None);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_list_sorted() {
        let store = MemoryStore::new();
        for id in ["lamp2", "fan1", "lamp1"] {
            store.upsert(envelope(DeviceRecord::new(id))).await.unwrap();
        }

        let ids: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.device_id)
            .collect();
        assert_eq!(ids, vec!["fan1", "lamp1", "lamp2"]);
        assert!(store.get("missing").await.unwrap().is_none());
    }
}
