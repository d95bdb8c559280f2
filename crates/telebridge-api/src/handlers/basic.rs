//! Health check.

use axum::extract::State;
use serde::Serialize;

use super::common::{ok, HandlerResult};
use super::ServerState;

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// `healthy`, or `degraded` when the store could not be opened.
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub uptime: u64,
    pub store_backend: &'static str,
    pub store_available: bool,
    pub broker: String,
}

/// Report store availability and the configured broker.
///
/// The broker is not contacted; it is only reached per request.
pub async fn health_handler(State(state): State<ServerState>) -> HandlerResult<HealthStatus> {
    let uptime = chrono::Utc::now().timestamp() - state.started_at;
    let health = state.bridge.health();

    ok(HealthStatus {
        status: if health.store_available { "healthy" } else { "degraded" },
        service: "telebridge",
        version: env!("CARGO_PKG_VERSION"),
        uptime: uptime.max(0) as u64,
        store_backend: health.store_backend,
        store_available: health.store_available,
        broker: health.broker,
    })
}
