//! Application router configuration.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::types::ServerState;
use crate::handlers::{basic, devices, sync};

/// Build the router with every route mounted under `prefix` (e.g. `/api`).
pub fn create_router(state: ServerState, prefix: &str) -> Router {
    let routes = Router::new()
        .route("/health", get(basic::health_handler))
        .route("/devices", get(devices::list_devices_handler))
        .route(
            "/devices/:device_id/status",
            get(devices::get_device_status_handler),
        )
        .route(
            "/devices/:device_id/command",
            post(devices::send_command_handler),
        )
        .route("/crons/sync_mqtt", get(sync::cron_sync_handler));

    let prefix = prefix.trim_end_matches('/');
    let router = if prefix.is_empty() {
        routes
    } else {
        Router::new().nest(prefix, routes)
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
