//! In-process broker.
//!
//! Routes publishes between sessions of the same process with MQTT topic
//! filter semantics. Delivery is at-most-once: a subscriber whose channel is
//! full misses the message. Used by tests and by offline demos.
//!
//! The broker keeps a bounded history of published messages and client ids
//! for inspection; the oldest entries are dropped once the limit is reached.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use telebridge_core::Qos;
use tokio::sync::mpsc;

use crate::session::{session_client_id, topic_matches, DeliveryResult, InboundMessage, Session, SessionFactory};
use crate::{PublishFailure, Result, TransportError};

const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
const DEFAULT_HISTORY_LIMIT: usize = 10_000;

struct Subscription {
    session_id: u64,
    filter: String,
    qos: Qos,
    tx: mpsc::Sender<InboundMessage>,
}

#[derive(Default)]
struct BrokerState {
    subscriptions: Vec<Subscription>,
    open_sessions: HashSet<u64>,
    client_ids: VecDeque<String>,
    published: VecDeque<InboundMessage>,
}

fn push_bounded<T>(history: &mut VecDeque<T>, item: T, limit: usize) {
    if history.len() >= limit {
        history.pop_front();
    }
    history.push_back(item);
}

struct BrokerInner {
    state: Mutex<BrokerState>,
    next_session: AtomicU64,
    next_packet: AtomicU64,
    offline: AtomicBool,
    client_id_prefix: String,
    channel_capacity: usize,
    history_limit: usize,
}

/// Shared in-process broker. Cloning yields another handle to the same broker.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new("memory_client")
    }
}

impl MemoryBroker {
    pub fn new(client_id_prefix: impl Into<String>) -> Self {
        Self::with_history_limit(client_id_prefix, DEFAULT_HISTORY_LIMIT)
    }

    /// Keep at most `limit` published messages and client ids (minimum 1).
    pub fn with_history_limit(client_id_prefix: impl Into<String>, limit: usize) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                state: Mutex::new(BrokerState::default()),
                next_session: AtomicU64::new(1),
                next_packet: AtomicU64::new(1),
                offline: AtomicBool::new(false),
                client_id_prefix: client_id_prefix.into(),
                channel_capacity: DEFAULT_CHANNEL_CAPACITY,
                history_limit: limit.max(1),
            }),
        }
    }

    /// Refuse new connections while `offline` is true.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Sessions currently open.
    pub fn open_sessions(&self) -> usize {
        self.inner.state.lock().open_sessions.len()
    }

    /// Client ids of the most recently opened sessions, oldest first.
    pub fn client_ids(&self) -> Vec<String> {
        self.inner.state.lock().client_ids.iter().cloned().collect()
    }

    /// Most recently published messages, oldest first.
    pub fn published(&self) -> Vec<InboundMessage> {
        self.inner.state.lock().published.iter().cloned().collect()
    }

    /// Messages published on topics matching `filter`.
    pub fn published_on(&self, filter: &str) -> Vec<InboundMessage> {
        self.published()
            .into_iter()
            .filter(|m| topic_matches(filter, &m.topic))
            .collect()
    }

    /// Publish without a session, as a device outside the bridge would.
    pub fn inject(&self, topic: &str, payload: impl Into<Vec<u8>>, qos: Qos) -> usize {
        self.route(topic, payload.into(), qos)
    }

    /// Deliver to matching subscriptions; returns the number of receivers.
    fn route(&self, topic: &str, payload: Vec<u8>, qos: Qos) -> usize {
        let limit = self.inner.history_limit;
        let mut state = self.inner.state.lock();
        push_bounded(
            &mut state.published,
            InboundMessage {
                topic: topic.to_string(),
                qos,
                payload: payload.clone(),
                retain: false,
            },
            limit,
        );

        let mut delivered = 0;
        for sub in state.subscriptions.iter().filter(|s| topic_matches(&s.filter, topic)) {
            // Delivered QoS is the lower of publish and subscription QoS.
            let effective = if u8::from(sub.qos) < u8::from(qos) { sub.qos } else { qos };
            let message = InboundMessage {
                topic: topic.to_string(),
                qos: effective,
                payload: payload.clone(),
                retain: false,
            };
            if sub.tx.try_send(message).is_ok() {
                delivered += 1;
            } else {
                tracing::debug!(session = sub.session_id, topic, "Subscriber channel full or closed, message dropped");
            }
        }
        delivered
    }

    fn release(&self, session_id: u64) {
        let mut state = self.inner.state.lock();
        state.subscriptions.retain(|s| s.session_id != session_id);
        state.open_sessions.remove(&session_id);
    }
}

#[async_trait]
impl SessionFactory for MemoryBroker {
    async fn open(&self) -> Result<Box<dyn Session>> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectRefused {
                addr: self.broker_addr(),
                reason: "broker offline".to_string(),
            });
        }

        let session_id = self.inner.next_session.fetch_add(1, Ordering::SeqCst);
        let client_id = session_client_id(&self.inner.client_id_prefix);
        {
            let mut state = self.inner.state.lock();
            state.open_sessions.insert(session_id);
            push_bounded(&mut state.client_ids, client_id.clone(), self.inner.history_limit);
        }

        let (tx, rx) = mpsc::channel(self.inner.channel_capacity);
        Ok(Box::new(MemorySession {
            broker: self.clone(),
            session_id,
            client_id,
            tx,
            rx: Some(rx),
            closed: false,
        }))
    }

    fn broker_addr(&self) -> String {
        "memory".to_string()
    }
}

/// Session on a [`MemoryBroker`].
pub struct MemorySession {
    broker: MemoryBroker,
    session_id: u64,
    client_id: String,
    tx: mpsc::Sender<InboundMessage>,
    rx: Option<mpsc::Receiver<InboundMessage>>,
    closed: bool,
}

#[async_trait]
impl Session for MemorySession {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn is_connected(&self) -> bool {
        !self.closed
    }

    async fn subscribe(&mut self, topic: &str, qos: Qos) -> Result<()> {
        if self.closed {
            return Err(TransportError::Subscribe {
                topic: topic.to_string(),
                reason: "session is not connected".to_string(),
            });
        }
        self.broker.inner.state.lock().subscriptions.push(Subscription {
            session_id: self.session_id,
            filter: topic.to_string(),
            qos,
            tx: self.tx.clone(),
        });
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>, qos: Qos) -> Result<DeliveryResult> {
        if self.closed {
            return Err(TransportError::Publish {
                topic: topic.to_string(),
                code: PublishFailure::NotConnected,
                reason: "session is not connected".to_string(),
            });
        }
        self.broker.route(topic, payload, qos);

        let packet_id = match qos {
            Qos::AtMostOnce => None,
            _ => Some((self.broker.inner.next_packet.fetch_add(1, Ordering::SeqCst) % 65535 + 1) as u16),
        };
        Ok(DeliveryResult {
            topic: topic.to_string(),
            qos,
            packet_id,
            acknowledged: qos != Qos::AtMostOnce,
        })
    }

    fn take_messages(&mut self) -> Option<mpsc::Receiver<InboundMessage>> {
        self.rx.take()
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.broker.release(self.session_id);
        }
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            self.broker.release(self.session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_routes_by_filter() {
        let broker = MemoryBroker::default();
        let mut listener = broker.open().await.unwrap();
        listener.subscribe("smarthome/control/+", Qos::AtLeastOnce).await.unwrap();
        let mut rx = listener.take_messages().unwrap();
        assert!(listener.take_messages().is_none());

        let mut publisher = broker.open().await.unwrap();
        publisher
            .publish("smarthome/control/lamp1", b"on".to_vec(), Qos::ExactlyOnce)
            .await
            .unwrap();
        publisher
            .publish("smarthome/data", b"ignored".to_vec(), Qos::AtLeastOnce)
            .await
            .unwrap();

        let message = rx.recv().await.unwrap();
        assert_eq!(message.topic, "smarthome/control/lamp1");
        assert_eq!(message.qos, Qos::AtLeastOnce);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_releases_subscriptions() {
        let broker = MemoryBroker::default();
        let mut session = broker.open().await.unwrap();
        session.subscribe("#", Qos::AtMostOnce).await.unwrap();
        assert_eq!(broker.open_sessions(), 1);

        session.close().await;
        session.close().await;
        assert_eq!(broker.open_sessions(), 0);
        assert_eq!(broker.inject("a/b", b"x".to_vec(), Qos::AtMostOnce), 0);
        assert!(session.subscribe("#", Qos::AtMostOnce).await.is_err());
    }

    #[tokio::test]
    async fn test_drop_releases_session() {
        let broker = MemoryBroker::default();
        {
            let mut session = broker.open().await.unwrap();
            session.subscribe("#", Qos::AtMostOnce).await.unwrap();
        }
        assert_eq!(broker.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let broker = MemoryBroker::with_history_limit("bounded", 3);
        for i in 0..5 {
            broker.inject(&format!("smarthome/data/{}", i), b"x".to_vec(), Qos::AtMostOnce);
        }
        let topics: Vec<String> = broker.published().into_iter().map(|m| m.topic).collect();
        assert_eq!(topics, ["smarthome/data/2", "smarthome/data/3", "smarthome/data/4"]);

        for _ in 0..4 {
            broker.open().await.unwrap().close().await;
        }
        assert_eq!(broker.client_ids().len(), 3);
        assert_eq!(broker.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_offline_refuses() {
        let broker = MemoryBroker::default();
        broker.set_offline(true);
        assert!(matches!(
            broker.open().await,
            Err(TransportError::ConnectRefused { .. })
        ));
    }
}
