//! Broker transport for the Telebridge bridge.
//!
//! ## Features
//!
//! - **Session**: a single-use connection with subscribe, publish and close
//! - **MqttSessionFactory**: sessions over rumqttc, one fresh client id per open
//! - **MemoryBroker**: in-process broker with the same session interface
//!
//! Everything above this crate depends on [`SessionFactory`] only, so the
//! bridge can run against a real broker or the in-process one.

pub mod client;
pub mod error;
pub mod memory;
pub mod session;

pub use client::{MqttSession, MqttSessionFactory};
pub use error::{PublishFailure, Result, TransportError};
pub use memory::{MemoryBroker, MemorySession};
pub use session::{
    session_client_id, topic_matches, DeliveryResult, InboundMessage, Session, SessionFactory,
};
