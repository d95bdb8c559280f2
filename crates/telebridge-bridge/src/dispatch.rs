//! Command dispatch.
//!
//! Commands go out fire-and-forget on `<control_root>/<device_id>`. The
//! answer is whatever the device reports next on the telemetry topic, so a
//! dispatch is: open a telemetry window, publish the command on its own
//! session, keep the window open for the ack wait, then look at the store.
//!
//! Devices are not required to echo `command_id`. A report counts as the
//! reply when it is for the same device and was ingested after the command
//! was issued. An unrelated report arriving in that gap is indistinguishable
//! from a reply.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use telebridge_core::{Command, DeviceRecord, Envelope, Qos};
use telebridge_mqtt::{DeliveryResult, SessionFactory};
use telebridge_storage::SharedStore;
use tracing::{info, info_span, warn, Instrument};

use crate::sync::SyncWindowController;
use crate::Result;

/// Result of one command round trip.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// The device reported after the command and did not refuse it.
    Accepted { command: Command, record: DeviceRecord },
    /// The device reported `command_ack.success == false`.
    Rejected { command: Command, record: DeviceRecord },
    /// No report for the device arrived within the ack wait.
    Timeout { command: Command },
}

impl CommandOutcome {
    pub fn command(&self) -> &Command {
        match self {
            Self::Accepted { command, .. }
            | Self::Rejected { command, .. }
            | Self::Timeout { command } => command,
        }
    }

    /// Record the device reported, if it answered.
    pub fn record(&self) -> Option<&DeviceRecord> {
        match self {
            Self::Accepted { record, .. } | Self::Rejected { record, .. } => Some(record),
            Self::Timeout { .. } => None,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Accepted { .. } => "accepted",
            Self::Rejected { .. } => "rejected",
            Self::Timeout { .. } => "timeout",
        }
    }
}

/// Decide the outcome from the device's latest envelope.
pub fn correlate(command: Command, latest: Option<Envelope>) -> CommandOutcome {
    match latest {
        Some(envelope) if envelope.received_since(command.issued_at) => {
            if envelope.record.ack_success() == Some(false) {
                CommandOutcome::Rejected {
                    command,
                    record: envelope.record,
                }
            } else {
                CommandOutcome::Accepted {
                    command,
                    record: envelope.record,
                }
            }
        }
        _ => CommandOutcome::Timeout { command },
    }
}

/// Publishes commands and waits for the device to report back.
#[derive(Clone)]
pub struct CommandDispatcher {
    factory: Arc<dyn SessionFactory>,
    window: SyncWindowController,
    store: SharedStore,
    control_root: String,
    qos: Qos,
}

impl CommandDispatcher {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        window: SyncWindowController,
        store: SharedStore,
        control_root: impl Into<String>,
        qos: Qos,
    ) -> Self {
        Self {
            factory,
            window,
            store,
            control_root: control_root.into(),
            qos,
        }
    }

    /// Send `action` to a device and wait up to `ack_timeout` for its report.
    ///
    /// Invalid input fails before any broker connection is made.
    pub async fn dispatch(
        &self,
        device_id: &str,
        action: &str,
        value: Value,
        ack_timeout: Duration,
    ) -> Result<CommandOutcome> {
        let command = Command::new(device_id, action, value)?;
        self.store.check_available()?;

        let span = info_span!(
            "dispatch",
            command_id = %command.command_id,
            device_id = %command.device_id,
        );
        self.round_trip(command, ack_timeout).instrument(span).await
    }

    async fn round_trip(&self, command: Command, ack_timeout: Duration) -> Result<CommandOutcome> {
        // Subscribe first so a fast reply is not missed.
        let window = self.window.begin().await?;

        let delivery = match self.publish(&command).await {
            Ok(delivery) => delivery,
            Err(e) => {
                window.abandon().await;
                return Err(e);
            }
        };
        info!(
            action = %command.action,
            topic = %delivery.topic,
            packet_id = ?delivery.packet_id,
            acknowledged = delivery.acknowledged,
            "Command published"
        );

        let report = window.drain_for(ack_timeout).await;
        let latest = self.store.get(&command.device_id).await?;
        let outcome = correlate(command, latest);

        match &outcome {
            CommandOutcome::Timeout { .. } => warn!(
                received = report.received,
                "No report from device within ack wait"
            ),
            other => info!(status = other.status(), "Device reported back"),
        }
        Ok(outcome)
    }

    /// Publish on a dedicated session and close it.
    async fn publish(&self, command: &Command) -> Result<DeliveryResult> {
        let topic = command.topic(&self.control_root);
        let payload = command.to_payload()?;

        let mut session = self.factory.open().await?;
        let result = session.publish(&topic, payload, self.qos).await;
        session.close().await;
        Ok(result?)
    }
}
