//! Transport error types.

use std::time::Duration;

use thiserror::Error;

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Why a publish failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishFailure {
    /// The session was never connected or has been closed.
    NotConnected,
    /// The client refused to queue the request.
    Rejected,
    /// The connection dropped before the publish was flushed or acknowledged.
    ConnectionLost,
}

impl std::fmt::Display for PublishFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            PublishFailure::NotConnected => "not_connected",
            PublishFailure::Rejected => "rejected",
            PublishFailure::ConnectionLost => "connection_lost",
        };
        f.write_str(code)
    }
}

/// Transport error types.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The broker did not complete the handshake in time.
    #[error("Connection to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    /// The broker was unreachable or refused the connection.
    #[error("Connection to {addr} refused: {reason}")]
    ConnectRefused { addr: String, reason: String },

    /// Subscription could not be registered.
    #[error("Subscribe to '{topic}' failed: {reason}")]
    Subscribe { topic: String, reason: String },

    /// Publish failed.
    #[error("Publish to '{topic}' failed ({code}): {reason}")]
    Publish {
        topic: String,
        code: PublishFailure,
        reason: String,
    },
}
