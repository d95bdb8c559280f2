//! MQTT sessions using rumqttc.
//!
//! Each session owns one `AsyncClient` and a spawned task that drives its
//! event loop. The task forwards inbound publishes into a bounded channel
//! and reports handshake and acknowledgement packets back to the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, MqttOptions, Outgoing, Packet, SubscribeReasonCode};
use telebridge_core::{MqttConfig, Qos};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::session::{session_client_id, DeliveryResult, InboundMessage, Session, SessionFactory};
use crate::{PublishFailure, Result, TransportError};

/// Capacity of the client request queue.
const REQUEST_CAPACITY: usize = 10;

/// How long `close` waits for the disconnect to flush.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

fn to_rumqttc(qos: Qos) -> rumqttc::QoS {
    match qos {
        Qos::AtMostOnce => rumqttc::QoS::AtMostOnce,
        Qos::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        Qos::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

fn from_rumqttc(qos: rumqttc::QoS) -> Qos {
    match qos {
        rumqttc::QoS::AtMostOnce => Qos::AtMostOnce,
        rumqttc::QoS::AtLeastOnce => Qos::AtLeastOnce,
        rumqttc::QoS::ExactlyOnce => Qos::ExactlyOnce,
    }
}

/// Packet-level signals from the event loop task.
#[derive(Debug)]
enum Signal {
    /// A publish left the client with this packet id.
    Sent(u16),
    /// PubAck (QoS 1) or PubComp (QoS 2).
    Acked(u16),
    /// SubAck; `false` when the broker refused any filter.
    Subscribed(bool),
}

/// Opens rumqttc sessions against the configured broker.
#[derive(Debug, Clone)]
pub struct MqttSessionFactory {
    config: MqttConfig,
}

impl MqttSessionFactory {
    pub fn new(config: MqttConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &MqttConfig {
        &self.config
    }

    fn options(&self, client_id: &str) -> MqttOptions {
        let mut opts = MqttOptions::new(client_id, &self.config.broker, self.config.port);
        opts.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs.max(5)));
        opts.set_clean_session(true);

        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            opts.set_credentials(username, password);
        }
        opts
    }
}

#[async_trait]
impl SessionFactory for MqttSessionFactory {
    async fn open(&self) -> Result<Box<dyn Session>> {
        let addr = self.config.broker_addr();
        let client_id = session_client_id(&self.config.client_id_prefix);
        let timeout = self.config.connect_timeout();

        let (client, mut eventloop) = AsyncClient::new(self.options(&client_id), REQUEST_CAPACITY);
        let (message_tx, message_rx) = mpsc::channel(self.config.channel_capacity);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (connack_tx, connack_rx) = oneshot::channel::<std::result::Result<(), String>>();
        let connected = Arc::new(AtomicBool::new(false));

        let task_connected = connected.clone();
        let task_client_id = client_id.clone();
        let task = tokio::spawn(async move {
            let mut connack_tx = Some(connack_tx);

            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        let result = if ack.code == ConnectReturnCode::Success {
                            task_connected.store(true, Ordering::SeqCst);
                            Ok(())
                        } else {
                            Err(format!("{:?}", ack.code))
                        };
                        let refused = result.is_err();
                        if let Some(tx) = connack_tx.take() {
                            let _ = tx.send(result);
                        }
                        if refused {
                            break;
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let message = InboundMessage {
                            topic: publish.topic.clone(),
                            qos: from_rumqttc(publish.qos),
                            payload: publish.payload.to_vec(),
                            retain: publish.retain,
                        };
                        // The receiver is gone once the listen window closed.
                        if message_tx.send(message).await.is_err() {
                            debug!(client_id = %task_client_id, topic = %publish.topic, "Dropping message after window closed");
                        }
                    }
                    Ok(Event::Incoming(Packet::PubAck(ack))) => {
                        let _ = signal_tx.send(Signal::Acked(ack.pkid));
                    }
                    Ok(Event::Incoming(Packet::PubComp(comp))) => {
                        let _ = signal_tx.send(Signal::Acked(comp.pkid));
                    }
                    Ok(Event::Incoming(Packet::SubAck(ack))) => {
                        let accepted = ack
                            .return_codes
                            .iter()
                            .all(|code| !matches!(code, SubscribeReasonCode::Failure));
                        let _ = signal_tx.send(Signal::Subscribed(accepted));
                    }
                    Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                        let _ = signal_tx.send(Signal::Sent(pkid));
                    }
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        if let Some(tx) = connack_tx.take() {
                            let _ = tx.send(Err(e.to_string()));
                        } else {
                            warn!(client_id = %task_client_id, "MQTT connection lost: {}", e);
                        }
                        break;
                    }
                }
            }

            task_connected.store(false, Ordering::SeqCst);
            debug!(client_id = %task_client_id, "MQTT event loop stopped");
        });

        match tokio::time::timeout(timeout, connack_rx).await {
            Ok(Ok(Ok(()))) => {
                info!(client_id = %client_id, broker = %addr, "MQTT session connected");
                Ok(Box::new(MqttSession {
                    client_id,
                    client,
                    connected,
                    messages: Some(message_rx),
                    signals: signal_rx,
                    task: Some(task),
                    ack_timeout: self.config.publish_ack_timeout(),
                    subscribe_timeout: timeout,
                    closed: false,
                }))
            }
            Ok(Ok(Err(reason))) => {
                task.abort();
                Err(TransportError::ConnectRefused { addr, reason })
            }
            Ok(Err(_)) => {
                task.abort();
                Err(TransportError::ConnectRefused {
                    addr,
                    reason: "event loop stopped before handshake".to_string(),
                })
            }
            Err(_) => {
                task.abort();
                Err(TransportError::ConnectTimeout { addr, timeout })
            }
        }
    }

    fn broker_addr(&self) -> String {
        self.config.broker_addr()
    }
}

/// A connected rumqttc session.
pub struct MqttSession {
    client_id: String,
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    messages: Option<mpsc::Receiver<InboundMessage>>,
    signals: mpsc::UnboundedReceiver<Signal>,
    task: Option<JoinHandle<()>>,
    ack_timeout: Duration,
    subscribe_timeout: Duration,
    closed: bool,
}

impl MqttSession {
    /// Wait for the next signal matching `want`, bounded by `limit`.
    /// `Ok(None)` on timeout, `Err(())` once the event loop is gone.
    async fn wait_signal<T>(
        &mut self,
        limit: Duration,
        mut want: impl FnMut(&Signal) -> Option<T>,
    ) -> std::result::Result<Option<T>, ()> {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            match tokio::time::timeout_at(deadline, self.signals.recv()).await {
                Ok(Some(signal)) => {
                    if let Some(found) = want(&signal) {
                        return Ok(Some(found));
                    }
                }
                Ok(None) => return Err(()),
                Err(_) => return Ok(None),
            }
        }
    }
}

#[async_trait]
impl Session for MqttSession {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn is_connected(&self) -> bool {
        !self.closed && self.connected.load(Ordering::SeqCst)
    }

    async fn subscribe(&mut self, topic: &str, qos: Qos) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::Subscribe {
                topic: topic.to_string(),
                reason: "session is not connected".to_string(),
            });
        }

        self.client
            .subscribe(topic, to_rumqttc(qos))
            .await
            .map_err(|e| TransportError::Subscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        let limit = self.subscribe_timeout;
        match self
            .wait_signal(limit, |signal| match signal {
                Signal::Subscribed(accepted) => Some(*accepted),
                _ => None,
            })
            .await
        {
            Ok(Some(true)) => {
                debug!(client_id = %self.client_id, topic, "Subscribed");
                Ok(())
            }
            Ok(Some(false)) => Err(TransportError::Subscribe {
                topic: topic.to_string(),
                reason: "broker refused the subscription".to_string(),
            }),
            Ok(None) => {
                // Brokers may drop SubAck under load; the subscription is usually active.
                warn!(client_id = %self.client_id, topic, "No SubAck within {:?}", limit);
                Ok(())
            }
            Err(()) => Err(TransportError::Subscribe {
                topic: topic.to_string(),
                reason: "connection lost".to_string(),
            }),
        }
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>, qos: Qos) -> Result<DeliveryResult> {
        if !self.is_connected() {
            return Err(TransportError::Publish {
                topic: topic.to_string(),
                code: PublishFailure::NotConnected,
                reason: "session is not connected".to_string(),
            });
        }

        self.client
            .publish(topic, to_rumqttc(qos), false, payload)
            .await
            .map_err(|e| TransportError::Publish {
                topic: topic.to_string(),
                code: PublishFailure::Rejected,
                reason: e.to_string(),
            })?;

        let connection_lost = |topic: &str| TransportError::Publish {
            topic: topic.to_string(),
            code: PublishFailure::ConnectionLost,
            reason: "connection dropped mid-publish".to_string(),
        };

        let limit = self.ack_timeout;
        let packet_id = match self
            .wait_signal(limit, |signal| match signal {
                Signal::Sent(pkid) => Some(*pkid),
                _ => None,
            })
            .await
        {
            Ok(pkid) => pkid,
            Err(()) => return Err(connection_lost(topic)),
        };

        let acknowledged = match (qos, packet_id) {
            (Qos::AtMostOnce, _) | (_, None) => false,
            (_, Some(pkid)) => match self
                .wait_signal(limit, |signal| match signal {
                    Signal::Acked(acked) if *acked == pkid => Some(()),
                    _ => None,
                })
                .await
            {
                Ok(ack) => ack.is_some(),
                Err(()) => return Err(connection_lost(topic)),
            },
        };

        if !acknowledged && qos != Qos::AtMostOnce {
            warn!(client_id = %self.client_id, topic, "Publish not acknowledged within {:?}", limit);
        }

        Ok(DeliveryResult {
            topic: topic.to_string(),
            qos,
            packet_id: packet_id.filter(|_| qos != Qos::AtMostOnce),
            acknowledged,
        })
    }

    fn take_messages(&mut self) -> Option<mpsc::Receiver<InboundMessage>> {
        self.messages.take()
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if self.connected.load(Ordering::SeqCst) {
            if let Err(e) = self.client.disconnect().await {
                debug!(client_id = %self.client_id, "Disconnect request failed: {}", e);
            }
        }

        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
                task.abort();
            }
        }
        self.connected.store(false, Ordering::SeqCst);
        info!(client_id = %self.client_id, "MQTT session closed");
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        // Not closed explicitly (error or cancellation path).
        if self.client.try_disconnect().is_err() {
            if let Some(task) = self.task.take() {
                task.abort();
            }
        }
        debug!(client_id = %self.client_id, "MQTT session dropped without close");
    }
}
