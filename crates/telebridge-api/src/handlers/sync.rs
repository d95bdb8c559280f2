//! Periodic sync trigger.

use axum::extract::State;
use telebridge_bridge::SyncReport;

use super::common::{ok, HandlerResult};
use super::ServerState;

/// Run one long telemetry window. Meant to be hit by an external scheduler.
pub async fn cron_sync_handler(State(state): State<ServerState>) -> HandlerResult<SyncReport> {
    let report = state.bridge.run_cron_sync().await?;
    ok(report)
}
