//! Bridge error types.
//!
//! Every caller-visible failure falls in one of these classes. The HTTP
//! layer maps them to status codes; decode errors never reach this type.

use telebridge_mqtt::TransportError;
use telebridge_storage::StoreError;
use thiserror::Error;

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Bridge error types.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Malformed request, rejected before any transport activity.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No telemetry was ever ingested for this device.
    #[error("Device '{0}' not found.")]
    NotFound(String),

    /// Broker connect, subscribe or publish failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The state store could not be opened.
    #[error("Storage unavailable: {0}")]
    StoreUnavailable(String),

    /// A store operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Unexpected internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for BridgeError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(reason) => BridgeError::StoreUnavailable(reason),
            other => BridgeError::Storage(other.to_string()),
        }
    }
}

impl From<telebridge_core::Error> for BridgeError {
    fn from(e: telebridge_core::Error) -> Self {
        match e {
            telebridge_core::Error::Validation(msg) => BridgeError::Validation(msg),
            other => BridgeError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_mapping() {
        let err: BridgeError = StoreError::Unavailable("KV_URL is not set".to_string()).into();
        assert!(matches!(err, BridgeError::StoreUnavailable(_)));

        let err: BridgeError = StoreError::Backend("disk full".to_string()).into();
        assert!(matches!(err, BridgeError::Storage(_)));
    }

    #[test]
    fn test_not_found_message() {
        let err = BridgeError::NotFound("lamp99".to_string());
        assert_eq!(err.to_string(), "Device 'lamp99' not found.");
    }
}
