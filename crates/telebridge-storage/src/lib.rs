//! Device state storage.
//!
//! The bridge keeps exactly one current record per device. Three backends
//! implement the same last-write-wins contract:
//!
//! | Backend | Layout | Persistent |
//! |---------|--------|------------|
//! | `memory` | `DashMap<device_id, Envelope>` | no |
//! | `redb` | one keyed entry per device, overwritten on upsert | yes |
//! | `log` | append-only JSON lines; the last line per device wins | yes |
//!
//! A backend that fails to open is replaced by [`UnavailableStore`], so the
//! process keeps serving and reports the outage per call.

use std::sync::Arc;

use async_trait::async_trait;
use telebridge_core::{Envelope, StorageBackendKind, StorageConfig};

pub mod error;
pub mod log;
pub mod memory;
pub mod redb;
pub mod unavailable;

pub use error::{Result, StoreError};
pub use self::log::LogStore;
pub use memory::MemoryStore;
pub use self::redb::RedbStore;
pub use unavailable::UnavailableStore;

/// Mapping from device id to its most recently ingested envelope.
///
/// Implementations must make `upsert` atomic per key: a concurrent `get`
/// sees either the old or the new envelope, never a mix. Upserts to
/// different keys must not block each other for longer than a single write.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Replace the current envelope for `envelope.device_id`.
    async fn upsert(&self, envelope: Envelope) -> Result<()>;

    /// Current envelope for a device, if any telemetry was ever ingested.
    async fn get(&self, device_id: &str) -> Result<Option<Envelope>>;

    /// Current envelope of every known device, ordered by device id.
    async fn list(&self) -> Result<Vec<Envelope>>;

    /// Backend identifier used in logs and health output.
    fn backend_name(&self) -> &'static str;

    /// False when the store is running degraded.
    fn is_available(&self) -> bool {
        true
    }

    /// Fail with [`StoreError::Unavailable`] when running degraded.
    fn check_available(&self) -> Result<()> {
        Ok(())
    }
}

/// Shared handle to a store.
pub type SharedStore = Arc<dyn StateStore>;

/// Open the configured backend, propagating failures.
pub fn try_open_store(config: &StorageConfig) -> Result<SharedStore> {
    let store: SharedStore = match config.backend {
        StorageBackendKind::Memory => Arc::new(MemoryStore::new()),
        StorageBackendKind::Redb => Arc::new(RedbStore::open(config.resolved_path())?),
        StorageBackendKind::Log => Arc::new(LogStore::open(config.resolved_path())?),
    };
    tracing::info!(
        backend = store.backend_name(),
        path = %config.resolved_path(),
        "Device state store opened"
    );
    Ok(store)
}

/// Open the configured backend, degrading to [`UnavailableStore`] on failure.
pub fn open_store(config: &StorageConfig) -> SharedStore {
    match try_open_store(config) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(
                path = %config.resolved_path(),
                "Failed to open device state store, running degraded: {}",
                e
            );
            Arc::new(UnavailableStore::new(e.to_string()))
        }
    }
}

/// Get list of available backend types.
pub fn available_backends() -> Vec<&'static str> {
    vec!["memory", "redb", "log"]
}
