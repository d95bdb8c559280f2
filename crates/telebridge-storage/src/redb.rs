//! Keyed redb backend.
//!
//! One table maps `device_id` to the JSON-encoded envelope. Every upsert is
//! a single write transaction, so readers observe either the previous or the
//! new envelope.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use telebridge_core::Envelope;

use crate::{Result, StateStore};

const DEVICES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("devices");

/// redb-based persistent store.
pub struct RedbStore {
    db: Arc<Database>,
    path: PathBuf,
}

impl RedbStore {
    /// Open or create a database at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Database::create(path)?;

        // Create the table up front so read transactions never miss it.
        let txn = db.begin_write()?;
        txn.open_table(DEVICES_TABLE)?;
        txn.commit()?;

        Ok(Self {
            db: Arc::new(db),
            path: path.to_path_buf(),
        })
    }

    /// Get the storage path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn decode(device_id: &str, bytes: &[u8]) -> Option<Envelope> {
        match serde_json::from_slice::<Envelope>(bytes) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                tracing::warn!(device_id, "Skipping corrupted device entry: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl StateStore for RedbStore {
    async fn upsert(&self, envelope: Envelope) -> Result<()> {
        let value = serde_json::to_vec(&envelope)?;

        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(DEVICES_TABLE)?;
            table.insert(envelope.device_id.as_str(), value.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    async fn get(&self, device_id: &str) -> Result<Option<Envelope>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DEVICES_TABLE)?;

        match table.get(device_id)? {
            Some(value) => Ok(Self::decode(device_id, value.value())),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Envelope>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DEVICES_TABLE)?;

        // Keys iterate in sorted order.
        let mut envelopes = Vec::new();
        for item in table.iter()? {
            let (key, value) = item?;
            if let Some(envelope) = Self::decode(key.value(), value.value()) {
                envelopes.push(envelope);
            }
        }
        Ok(envelopes)
    }

    fn backend_name(&self) -> &'static str {
        "redb"
    }
}
