//! Core types for the Telebridge device bridge.
//!
//! This crate holds the data model shared by every other crate in the
//! workspace:
//! - **DeviceRecord**: the latest state a device reported about itself
//! - **Command**: a control message published to a single device
//! - **Envelope**: a record plus the receipt metadata captured at ingestion
//! - **BridgeConfig**: broker, topic, window and storage settings

pub mod command;
pub mod config;
pub mod device;
pub mod envelope;
pub mod error;

pub use command::Command;
pub use config::{ApiConfig, BridgeConfig, MqttConfig, StorageBackendKind, StorageConfig, SyncConfig, TopicConfig};
pub use device::{CommandAck, DeviceRecord, DeviceStatus, DeviceSummary, NOT_AVAILABLE};
pub use envelope::{Envelope, Qos};
pub use error::{Error, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
