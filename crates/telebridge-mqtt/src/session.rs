//! Transport session abstraction.
//!
//! A session is one connect / subscribe-or-publish / disconnect lifecycle.
//! Sessions are never reused: callers open one per operation and close it
//! when done. Dropping a session without calling `close` still releases the
//! connection.

use async_trait::async_trait;
use telebridge_core::Qos;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::Result;

/// A message delivered by the broker to a subscribed session.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub qos: Qos,
    pub payload: Vec<u8>,
    pub retain: bool,
}

/// Outcome of a successful publish.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryResult {
    pub topic: String,
    pub qos: Qos,
    /// Packet id assigned by the client, if the publish reached the wire.
    pub packet_id: Option<u16>,
    /// True once the broker acknowledged a QoS 1/2 publish.
    pub acknowledged: bool,
}

/// Opens sessions against one broker.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Connect with a fresh client identity.
    async fn open(&self) -> Result<Box<dyn Session>>;

    /// Broker address for logs.
    fn broker_addr(&self) -> String;
}

/// One connection to the broker.
#[async_trait]
pub trait Session: Send {
    /// Client identity used for this connection.
    fn client_id(&self) -> &str;

    fn is_connected(&self) -> bool;

    /// Register interest in `topic` (filters with `+`/`#` allowed).
    async fn subscribe(&mut self, topic: &str, qos: Qos) -> Result<()>;

    /// Publish and wait (bounded) for the broker acknowledgement.
    async fn publish(&mut self, topic: &str, payload: Vec<u8>, qos: Qos) -> Result<DeliveryResult>;

    /// Receiver for inbound publishes. Returns `None` after the first call.
    fn take_messages(&mut self) -> Option<mpsc::Receiver<InboundMessage>>;

    /// Disconnect. Calling it again is a no-op.
    async fn close(&mut self);
}

/// Generate a client id unique to one session.
pub fn session_client_id(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}", prefix, &suffix[..8])
}

/// MQTT topic filter matching with `+` and `#` wildcards.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_parts = filter.split('/');
    let mut topic_parts = topic.split('/');

    loop {
        match (filter_parts.next(), topic_parts.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ids_unique() {
        let a = session_client_id("cron_sync_client");
        let b = session_client_id("cron_sync_client");
        assert!(a.starts_with("cron_sync_client_"));
        assert_eq!(a.len(), "cron_sync_client_".len() + 8);
        assert_ne!(a, b);
    }

    #[test]
    fn test_topic_matches() {
        assert!(topic_matches("smarthome/data", "smarthome/data"));
        assert!(!topic_matches("smarthome/data", "smarthome/data/x"));
        assert!(topic_matches("smarthome/control/+", "smarthome/control/lamp1"));
        assert!(!topic_matches("smarthome/control/+", "smarthome/control"));
        assert!(topic_matches("smarthome/#", "smarthome/control/lamp1"));
        assert!(topic_matches("#", "anything/at/all"));
        assert!(!topic_matches("smarthome/+/lamp1", "smarthome/control/lamp2"));
    }
}
