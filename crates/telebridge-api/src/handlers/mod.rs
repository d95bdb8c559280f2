//! API handlers organized by domain.

pub mod basic;
pub mod common;
pub mod devices;
pub mod sync;

// Re-export ServerState so handlers can use it
pub use crate::server::ServerState;

pub use basic::health_handler;
pub use devices::{get_device_status_handler, list_devices_handler, send_command_handler};
pub use sync::cron_sync_handler;
