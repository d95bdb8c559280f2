//! Device telemetry records.
//!
//! A `DeviceRecord` is exactly what a device last published on the
//! telemetry topic. Known fields are typed; anything else the device sends
//! is kept in `extra` so the record reads back field-for-field. A known field
//! sent as an explicit `null` also lands in `extra`, which keeps the null on
//! the way back out while the typed field stays `None`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Placeholder used in summaries when a device did not report a field.
pub const NOT_AVAILABLE: &str = "N/A";

/// The most recently observed state of one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct DeviceRecord {
    /// Device unique identifier. Empty when the payload carried none.
    pub device_id: String,

    /// Free-form description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_description: Option<String>,

    /// Device type (e.g. "smart_lamp").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,

    /// Device-reported time in whatever format the device uses.
    /// Never used for ordering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,

    /// Reported status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DeviceStatus>,

    /// Present when this report answers a command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_ack: Option<CommandAck>,

    /// Fields not covered above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Status block of a device report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct DeviceStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub online: Option<bool>,

    /// Human-readable summary, opaque to the bridge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_data: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Acknowledgement block a device attaches when answering a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandAck {
    pub success: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Condensed view of a device used by the listing operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub device_id: String,
    pub device_description: String,
    pub device_type: Option<String>,
    pub last_reported_time: Value,
    pub status_summary: String,
}

/// Remove `key` from `fields` and decode it. An explicit `null` is put back
/// so it survives in the flattened `extra` map.
fn take_field<T: DeserializeOwned>(
    fields: &mut Map<String, Value>,
    key: &str,
) -> Result<Option<T>, serde_json::Error> {
    match fields.remove(key) {
        None => Ok(None),
        Some(Value::Null) => {
            fields.insert(key.to_string(), Value::Null);
            Ok(None)
        }
        Some(value) => serde_json::from_value(value).map(Some),
    }
}

impl TryFrom<Map<String, Value>> for DeviceRecord {
    type Error = serde_json::Error;

    fn try_from(mut fields: Map<String, Value>) -> Result<Self, Self::Error> {
        // A null id means "no id"; it is not kept, the empty id serializes in its place.
        let device_id = match fields.remove("device_id") {
            None | Some(Value::Null) => String::new(),
            Some(value) => serde_json::from_value(value)?,
        };
        Ok(Self {
            device_id,
            device_description: take_field(&mut fields, "device_description")?,
            device_type: take_field(&mut fields, "device_type")?,
            timestamp: take_field(&mut fields, "timestamp")?,
            status: take_field(&mut fields, "status")?,
            command_ack: take_field(&mut fields, "command_ack")?,
            extra: fields,
        })
    }
}

impl TryFrom<Map<String, Value>> for DeviceStatus {
    type Error = serde_json::Error;

    fn try_from(mut fields: Map<String, Value>) -> Result<Self, Self::Error> {
        Ok(Self {
            online: take_field(&mut fields, "online")?,
            text_data: take_field(&mut fields, "text_data")?,
            extra: fields,
        })
    }
}

impl DeviceRecord {
    /// Create a bare record for a device.
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            device_description: None,
            device_type: None,
            timestamp: None,
            status: None,
            command_ack: None,
            extra: Map::new(),
        }
    }

    /// Set the status block.
    pub fn with_status(mut self, online: bool, text_data: impl Into<String>) -> Self {
        self.status = Some(DeviceStatus {
            online: Some(online),
            text_data: Some(text_data.into()),
            extra: Map::new(),
        });
        self
    }

    /// Attach a command acknowledgement.
    pub fn with_command_ack(mut self, success: bool) -> Self {
        self.command_ack = Some(CommandAck {
            success,
            extra: Map::new(),
        });
        self
    }

    /// Whether the record carries a usable identifier.
    pub fn has_device_id(&self) -> bool {
        !self.device_id.trim().is_empty()
    }

    /// Online only when the device said so explicitly.
    pub fn is_online(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.online)
            .unwrap_or(false)
    }

    /// `Some(false)` when the device reported a failed command.
    pub fn ack_success(&self) -> Option<bool> {
        self.command_ack.as_ref().map(|ack| ack.success)
    }

    /// Build the listing summary, filling gaps with `N/A`.
    pub fn summary(&self) -> DeviceSummary {
        DeviceSummary {
            device_id: self.device_id.clone(),
            device_description: self
                .device_description
                .clone()
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            device_type: self.device_type.clone(),
            last_reported_time: self
                .timestamp
                .clone()
                .unwrap_or_else(|| Value::String(NOT_AVAILABLE.to_string())),
            status_summary: self
                .status
                .as_ref()
                .and_then(|s| s.text_data.clone())
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        }
    }
}
