//! Sync windows.
//!
//! A window is the only way device state gets refreshed: open a fresh
//! session, subscribe to the telemetry topic, feed every delivered message
//! through the ingest pipeline for a fixed duration, then disconnect.
//! Nothing is carried over from one window to the next.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use telebridge_core::Qos;
use telebridge_mqtt::{InboundMessage, Session, SessionFactory};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, info_span, Instrument};

use crate::ingest::{IngestOutcome, TelemetryIngestor};
use crate::{BridgeError, Result};

/// Counts collected over one window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub client_id: String,
    pub topic: String,
    /// Wall time the window stayed open.
    pub duration_ms: u64,
    pub received: usize,
    pub stored: usize,
    /// Decoded messages without a `device_id`.
    pub skipped: usize,
    pub decode_errors: usize,
    pub store_errors: usize,
    /// Devices updated during the window.
    pub devices: BTreeSet<String>,
}

impl SyncReport {
    fn new(client_id: &str, topic: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            topic: topic.to_string(),
            ..Default::default()
        }
    }

    fn record(&mut self, outcome: IngestOutcome) {
        self.received += 1;
        match outcome {
            IngestOutcome::Stored(device_id) => {
                self.stored += 1;
                self.devices.insert(device_id);
            }
            IngestOutcome::MissingDeviceId => self.skipped += 1,
            IngestOutcome::DecodeFailed(_) => self.decode_errors += 1,
            IngestOutcome::StoreFailed(_) => self.store_errors += 1,
        }
    }
}

/// Opens telemetry windows against one session factory.
#[derive(Clone)]
pub struct SyncWindowController {
    factory: Arc<dyn SessionFactory>,
    ingestor: TelemetryIngestor,
    topic: String,
    qos: Qos,
}

impl SyncWindowController {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        ingestor: TelemetryIngestor,
        topic: impl Into<String>,
        qos: Qos,
    ) -> Self {
        Self {
            factory,
            ingestor,
            topic: topic.into(),
            qos,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Connect and subscribe. Messages start buffering immediately; they
    /// are ingested once the returned window is drained.
    pub async fn begin(&self) -> Result<ActiveWindow> {
        let mut session = self.factory.open().await?;

        if let Err(e) = session.subscribe(&self.topic, self.qos).await {
            session.close().await;
            return Err(e.into());
        }

        let Some(messages) = session.take_messages() else {
            session.close().await;
            return Err(BridgeError::Internal(
                "session message stream already taken".to_string(),
            ));
        };

        debug!(client_id = session.client_id(), topic = %self.topic, "Sync window opened");
        Ok(ActiveWindow {
            session,
            messages,
            ingestor: self.ingestor.clone(),
            topic: self.topic.clone(),
        })
    }

    /// Open a window, listen for `duration`, close it.
    pub async fn run_window(&self, duration: Duration) -> Result<SyncReport> {
        let window = self.begin().await?;
        Ok(window.drain_for(duration).await)
    }
}

/// A subscribed session whose messages have not been ingested yet.
///
/// Dropping it without draining still disconnects the session.
pub struct ActiveWindow {
    session: Box<dyn Session>,
    messages: mpsc::Receiver<InboundMessage>,
    ingestor: TelemetryIngestor,
    topic: String,
}

impl ActiveWindow {
    pub fn client_id(&self) -> &str {
        self.session.client_id()
    }

    /// Ingest in delivery order until `duration` has elapsed, then close.
    ///
    /// The window always lasts the full duration, even if the stream ends
    /// early.
    pub async fn drain_for(self, duration: Duration) -> SyncReport {
        let span = info_span!(
            "sync_window",
            client_id = %self.session.client_id(),
            topic = %self.topic,
        );
        self.drain_inner(duration).instrument(span).await
    }

    async fn drain_inner(mut self, duration: Duration) -> SyncReport {
        let started = Instant::now();
        let deadline = started + duration;
        let mut report = SyncReport::new(self.session.client_id(), &self.topic);

        loop {
            match tokio::time::timeout_at(deadline, self.messages.recv()).await {
                Ok(Some(message)) => {
                    let outcome = self.ingestor.ingest(&message).await;
                    report.record(outcome);
                }
                Ok(None) => {
                    debug!("Message stream ended before the window closed");
                    tokio::time::sleep_until(deadline).await;
                    break;
                }
                Err(_) => break,
            }
        }

        self.session.close().await;
        report.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            received = report.received,
            stored = report.stored,
            skipped = report.skipped,
            decode_errors = report.decode_errors,
            store_errors = report.store_errors,
            duration_ms = report.duration_ms,
            "Sync window closed"
        );
        report
    }

    /// Close without ingesting anything.
    pub async fn abandon(mut self) {
        debug!(client_id = self.session.client_id(), "Sync window abandoned");
        self.session.close().await;
    }
}
