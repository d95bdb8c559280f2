//! Telemetry ingest pipeline.
//!
//! Turns one raw broker message into at most one store mutation. Nothing in
//! here returns an error to the caller: a bad message is logged and skipped
//! so the rest of the window keeps flowing.

use telebridge_core::{DeviceRecord, Envelope};
use telebridge_mqtt::InboundMessage;
use telebridge_storage::SharedStore;
use tracing::{debug, warn};

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Record stored for this device.
    Stored(String),
    /// Decoded, but carried no `device_id`.
    MissingDeviceId,
    /// Payload was not a valid device record.
    DecodeFailed(String),
    /// Decoded, but the store rejected the write.
    StoreFailed(String),
}

/// Decode, validate and upsert telemetry.
#[derive(Clone)]
pub struct TelemetryIngestor {
    store: SharedStore,
}

impl TelemetryIngestor {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Ingest one message.
    pub async fn ingest(&self, message: &InboundMessage) -> IngestOutcome {
        let record: DeviceRecord = match serde_json::from_slice(&message.payload) {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    topic = %message.topic,
                    bytes = message.payload.len(),
                    error = %e,
                    "Discarding undecodable telemetry"
                );
                return IngestOutcome::DecodeFailed(e.to_string());
            }
        };

        if !record.has_device_id() {
            debug!(topic = %message.topic, "Discarding telemetry without device_id");
            return IngestOutcome::MissingDeviceId;
        }

        let envelope = Envelope::new(message.topic.clone(), message.qos, record);
        let device_id = envelope.device_id.clone();
        match self.store.upsert(envelope).await {
            Ok(()) => {
                debug!(device_id = %device_id, topic = %message.topic, "Stored device state");
                IngestOutcome::Stored(device_id)
            }
            Err(e) => {
                warn!(device_id = %device_id, error = %e, "Failed to store device state");
                IngestOutcome::StoreFailed(e.to_string())
            }
        }
    }
}
