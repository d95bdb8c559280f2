//! Device listing, status and command handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde_json::json;
use telebridge_bridge::CommandOutcome;
use telebridge_core::{DeviceRecord, DeviceSummary};

use super::common::{ok, HandlerResult};
use super::ServerState;
use crate::models::{CommandResponse, ErrorResponse, ListDevicesQuery, SendCommandRequest};

/// List known devices after a refresh window.
pub async fn list_devices_handler(
    State(state): State<ServerState>,
    Query(query): Query<ListDevicesQuery>,
) -> HandlerResult<Vec<DeviceSummary>> {
    let devices = state.bridge.list_devices(query.online_only).await?;
    ok(devices)
}

/// Full latest record of one device.
pub async fn get_device_status_handler(
    State(state): State<ServerState>,
    Path(device_id): Path<String>,
) -> HandlerResult<DeviceRecord> {
    let record = state.bridge.get_device_status(&device_id).await?;
    ok(record)
}

/// Publish a command and wait for the device to report back.
///
/// 200 with the new device state, 409 when the device refused, 408 when it
/// stayed silent. A body that is not a JSON object is a 400.
pub async fn send_command_handler(
    State(state): State<ServerState>,
    Path(device_id): Path<String>,
    body: Result<Json<SendCommandRequest>, JsonRejection>,
) -> HandlerResult<CommandResponse> {
    let Json(req) = body.map_err(|rejection| {
        ErrorResponse::bad_request("Request must be JSON")
            .with_details(json!({ "reason": rejection.body_text() }))
    })?;
    let action = req.action.unwrap_or_default();
    let outcome = state
        .bridge
        .send_command(&device_id, &action, req.value)
        .await?;

    match outcome {
        CommandOutcome::Accepted { command, record } => ok(CommandResponse {
            command_id: command.command_id,
            device_id: command.device_id,
            action: command.action,
            value: command.value,
            status: "accepted",
            device_status: record,
        }),
        CommandOutcome::Rejected { command, record } => Err(ErrorResponse::conflict(format!(
            "Device '{}' rejected command '{}'",
            command.device_id, command.action
        ))
        .with_details(json!({
            "command_id": command.command_id,
            "device_status": record,
        }))),
        CommandOutcome::Timeout { command } => Err(ErrorResponse::request_timeout(format!(
            "Command sent, but device '{}' did not report back within {} ms",
            command.device_id,
            state.bridge.timing().ack_timeout.as_millis()
        ))
        .with_details(json!({ "command_id": command.command_id }))),
    }
}
