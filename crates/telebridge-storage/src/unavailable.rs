//! Placeholder store used when the configured backend failed to open.

use async_trait::async_trait;
use telebridge_core::Envelope;

use crate::{Result, StateStore, StoreError};

/// Every operation fails with [`StoreError::Unavailable`].
#[derive(Debug, Clone)]
pub struct UnavailableStore {
    reason: String,
}

impl UnavailableStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    fn error(&self) -> StoreError {
        StoreError::Unavailable(self.reason.clone())
    }
}

#[async_trait]
impl StateStore for UnavailableStore {
    async fn upsert(&self, _envelope: Envelope) -> Result<()> {
        Err(self.error())
    }

    async fn get(&self, _device_id: &str) -> Result<Option<Envelope>> {
        Err(self.error())
    }

    async fn list(&self) -> Result<Vec<Envelope>> {
        Err(self.error())
    }

    fn backend_name(&self) -> &'static str {
        "unavailable"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn check_available(&self) -> Result<()> {
        Err(self.error())
    }
}
