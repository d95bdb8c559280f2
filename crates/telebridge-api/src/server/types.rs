//! Shared server state.

use telebridge_bridge::DeviceBridge;

/// State handed to every handler.
#[derive(Clone)]
pub struct ServerState {
    pub bridge: DeviceBridge,
    /// Unix seconds at startup.
    pub started_at: i64,
}

impl ServerState {
    pub fn new(bridge: DeviceBridge) -> Self {
        Self {
            bridge,
            started_at: chrono::Utc::now().timestamp(),
        }
    }
}
