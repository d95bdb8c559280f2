//! Receipt metadata wrapped around ingested records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::device::DeviceRecord;
use crate::Error;

/// MQTT QoS level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Qos {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl Default for Qos {
    fn default() -> Self {
        Self::AtLeastOnce
    }
}

impl TryFrom<u8> for Qos {
    type Error = Error;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(Qos::AtMostOnce),
            1 => Ok(Qos::AtLeastOnce),
            2 => Ok(Qos::ExactlyOnce),
            other => Err(Error::Config(format!("invalid QoS level: {}", other))),
        }
    }
}

impl From<Qos> for u8 {
    fn from(qos: Qos) -> Self {
        qos as u8
    }
}

impl std::fmt::Display for Qos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

/// One ingested record with the metadata captured when it arrived.
///
/// Envelopes are immutable. The keyed backends overwrite the envelope for a
/// device; the log backend appends a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Bridge wall-clock time at ingestion.
    pub received_at: DateTime<Utc>,
    /// Topic the message arrived on.
    pub topic: String,
    /// QoS the broker delivered the message with.
    pub qos: Qos,
    pub device_id: String,
    #[serde(rename = "device_data")]
    pub record: DeviceRecord,
}

impl Envelope {
    /// Wrap a record received now.
    pub fn new(topic: impl Into<String>, qos: Qos, record: DeviceRecord) -> Self {
        Self {
            received_at: Utc::now(),
            topic: topic.into(),
            qos,
            device_id: record.device_id.clone(),
            record,
        }
    }

    /// Whether this envelope was ingested at or after `instant`.
    pub fn received_since(&self, instant: DateTime<Utc>) -> bool {
        self.received_at >= instant
    }
}
