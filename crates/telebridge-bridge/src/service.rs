//! The bridge facade used by the HTTP surface and the CLI.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use telebridge_core::{BridgeConfig, DeviceRecord, DeviceSummary, SyncConfig, TopicConfig};
use telebridge_mqtt::{MqttSessionFactory, SessionFactory};
use telebridge_storage::{open_store, SharedStore};
use tracing::debug;

use crate::dispatch::{CommandDispatcher, CommandOutcome};
use crate::ingest::TelemetryIngestor;
use crate::sync::{SyncReport, SyncWindowController};
use crate::{BridgeError, Result};

/// How long each kind of operation listens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeTiming {
    /// Window opened before every read.
    pub read_window: Duration,
    /// Window opened by the periodic sync.
    pub cron_window: Duration,
    /// Wait for a device to report after a command.
    pub ack_timeout: Duration,
    pub sync_on_read: bool,
}

impl From<&SyncConfig> for BridgeTiming {
    fn from(config: &SyncConfig) -> Self {
        Self {
            read_window: config.window(),
            cron_window: config.cron_window(),
            ack_timeout: config.ack_timeout(),
            sync_on_read: config.sync_on_read,
        }
    }
}

impl Default for BridgeTiming {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

/// Store and broker status for health checks.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeHealth {
    pub store_backend: &'static str,
    pub store_available: bool,
    pub broker: String,
}

/// Synchronous device operations over an asynchronous broker.
///
/// Every operation is independent: it opens its own sessions, waits a
/// bounded time and closes them again. The store is the only state shared
/// between concurrent calls.
#[derive(Clone)]
pub struct DeviceBridge {
    store: SharedStore,
    factory: Arc<dyn SessionFactory>,
    sync: SyncWindowController,
    dispatcher: CommandDispatcher,
    timing: BridgeTiming,
}

impl DeviceBridge {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        store: SharedStore,
        topics: &TopicConfig,
        timing: BridgeTiming,
    ) -> Self {
        let ingestor = TelemetryIngestor::new(store.clone());
        let sync = SyncWindowController::new(
            factory.clone(),
            ingestor,
            topics.data_topic.clone(),
            topics.subscribe_qos,
        );
        let dispatcher = CommandDispatcher::new(
            factory.clone(),
            sync.clone(),
            store.clone(),
            topics.control_root.clone(),
            topics.publish_qos,
        );
        Self {
            store,
            factory,
            sync,
            dispatcher,
            timing,
        }
    }

    /// Build against the configured broker and store.
    ///
    /// A store that fails to open leaves the bridge running degraded.
    pub fn from_config(config: &BridgeConfig) -> Self {
        let factory: Arc<dyn SessionFactory> = Arc::new(MqttSessionFactory::new(config.mqtt.clone()));
        let store = open_store(&config.storage);
        Self::new(factory, store, &config.topics, BridgeTiming::from(&config.sync))
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn timing(&self) -> &BridgeTiming {
        &self.timing
    }

    pub fn health(&self) -> BridgeHealth {
        BridgeHealth {
            store_backend: self.store.backend_name(),
            store_available: self.store.is_available(),
            broker: self.factory.broker_addr(),
        }
    }

    /// Open a read window unless reads are configured to serve stored state.
    async fn refresh(&self) -> Result<Option<SyncReport>> {
        self.store.check_available()?;
        if !self.timing.sync_on_read {
            debug!("Serving stored state without a refresh window");
            return Ok(None);
        }
        let report = self.sync.run_window(self.timing.read_window).await?;
        Ok(Some(report))
    }

    /// Summaries of every known device, optionally only those online.
    pub async fn list_devices(&self, online_only: bool) -> Result<Vec<DeviceSummary>> {
        self.refresh().await?;
        let envelopes = self.store.list().await?;
        Ok(envelopes
            .iter()
            .map(|envelope| &envelope.record)
            .filter(|record| !online_only || record.is_online())
            .map(DeviceRecord::summary)
            .collect())
    }

    /// Full latest record of one device.
    pub async fn get_device_status(&self, device_id: &str) -> Result<DeviceRecord> {
        if device_id.trim().is_empty() {
            return Err(BridgeError::Validation("device_id must not be empty".to_string()));
        }
        self.refresh().await?;
        self.store
            .get(device_id)
            .await?
            .map(|envelope| envelope.record)
            .ok_or_else(|| BridgeError::NotFound(device_id.to_string()))
    }

    /// Publish a command and wait for the device to report back.
    pub async fn send_command(
        &self,
        device_id: &str,
        action: &str,
        value: Value,
    ) -> Result<CommandOutcome> {
        self.dispatcher
            .dispatch(device_id, action, value, self.timing.ack_timeout)
            .await
    }

    /// One long window, as run by the periodic trigger.
    pub async fn run_cron_sync(&self) -> Result<SyncReport> {
        self.store.check_available()?;
        self.sync.run_window(self.timing.cron_window).await
    }
}
