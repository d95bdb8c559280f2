//! HTTP surface of the Telebridge device bridge.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | GET | `<prefix>/health` | store and broker status |
//! | GET | `<prefix>/devices?online_only=` | device summaries |
//! | GET | `<prefix>/devices/:device_id/status` | latest device record |
//! | POST | `<prefix>/devices/:device_id/command` | publish and await report |
//! | GET | `<prefix>/crons/sync_mqtt` | run the periodic sync window |

pub mod handlers;
pub mod models;
pub mod server;

pub use server::{create_router, run, ServerState};
