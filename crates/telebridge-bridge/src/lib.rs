//! Synchronous request/response access to MQTT devices.
//!
//! ## Architecture
//!
//! ```text
//! DeviceBridge
//!   ├── SyncWindowController ── Session (subscribe data topic) ── TelemetryIngestor ── StateStore
//!   └── CommandDispatcher ───── Session (publish control topic) + SyncWindowController
//! ```
//!
//! There is no long-lived listener. Reads open a short telemetry window
//! first; commands publish and then listen for the ack wait; a periodic
//! trigger runs a longer window to keep the store warm.

pub mod dispatch;
pub mod error;
pub mod ingest;
pub mod service;
pub mod sync;

pub use dispatch::{correlate, CommandDispatcher, CommandOutcome};
pub use error::{BridgeError, Result};
pub use ingest::{IngestOutcome, TelemetryIngestor};
pub use service::{BridgeHealth, BridgeTiming, DeviceBridge};
pub use sync::{ActiveWindow, SyncReport, SyncWindowController};
