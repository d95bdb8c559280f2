//! Control commands published to devices.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{Error, Result};

/// A command addressed to a single device.
///
/// `command_id` is generated locally. Devices are not required to echo it,
/// so it only identifies the command in logs and API responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub command_id: String,
    pub device_id: String,
    pub action: String,
    #[serde(default)]
    pub value: Value,
    /// Unix seconds at which the command was built.
    pub timestamp: i64,
    /// Wall-clock instant the command was issued, used for correlation.
    #[serde(skip, default = "Utc::now")]
    pub issued_at: DateTime<Utc>,
}

impl Command {
    /// Build a command, validating the required fields.
    pub fn new(device_id: impl Into<String>, action: impl Into<String>, value: Value) -> Result<Self> {
        let device_id = device_id.into();
        let action = action.into();

        if device_id.trim().is_empty() {
            return Err(Error::Validation("device_id must not be empty".to_string()));
        }
        if device_id.contains(['/', '+', '#']) {
            return Err(Error::Validation(format!(
                "device_id '{}' contains a reserved topic character",
                device_id
            )));
        }
        if action.trim().is_empty() {
            return Err(Error::Validation("Missing 'action' in request body".to_string()));
        }

        let issued_at = Utc::now();
        Ok(Self {
            command_id: generate_command_id(),
            device_id,
            action,
            value,
            timestamp: issued_at.timestamp(),
            issued_at,
        })
    }

    /// Topic this command is published on under `control_root`.
    pub fn topic(&self, control_root: &str) -> String {
        format!("{}/{}", control_root.trim_end_matches('/'), self.device_id)
    }

    /// Wire payload.
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// `cmd_` followed by eight hex digits. Collisions are unlikely, not impossible.
fn generate_command_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("cmd_{}", &hex[..8])
}
