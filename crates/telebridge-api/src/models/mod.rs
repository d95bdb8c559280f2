//! Request and response models for the web API.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use telebridge_core::DeviceRecord;

pub mod common;
pub mod error;

pub use common::{ApiError, ApiResponse, ErrorCode, ResponseMeta};
pub use error::{ApiResult, ErrorResponse};

/// Query string of the device listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListDevicesQuery {
    /// Only devices whose last report said `online: true`.
    #[serde(default)]
    pub online_only: bool,
}

/// Body of a command request.
///
/// `action` is optional here so a missing action is reported through the
/// regular validation error instead of a body rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendCommandRequest {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub value: Value,
}

/// Successful command round trip.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResponse {
    pub command_id: String,
    pub device_id: String,
    pub action: String,
    pub value: Value,
    pub status: &'static str,
    /// What the device reported after the command.
    pub device_status: DeviceRecord,
}
