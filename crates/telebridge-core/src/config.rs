//! Bridge configuration.
//!
//! Values are resolved in three layers: built-in defaults, an optional TOML
//! file, then environment variables. The binary applies CLI flags last.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::envelope::Qos;
use crate::{Error, Result};

/// Default values.
pub mod defaults {
    pub const BROKER: &str = "broker.emqx.io";
    pub const PORT: u16 = 1883;
    pub const CLIENT_ID_PREFIX: &str = "telebridge";
    pub const KEEP_ALIVE_SECS: u64 = 60;
    pub const CONNECT_TIMEOUT_SECS: u64 = 10;
    pub const PUBLISH_ACK_TIMEOUT_MS: u64 = 500;
    pub const CHANNEL_CAPACITY: usize = 1000;
    pub const DATA_TOPIC: &str = "smarthome/data";
    pub const CONTROL_TOPIC: &str = "smarthome/control";
    pub const WINDOW_SECS: u64 = 3;
    pub const CRON_WINDOW_SECS: u64 = 55;
    pub const ACK_TIMEOUT_SECS: u64 = 3;
    pub const LOG_FILE: &str = "/tmp/device_data_log.jsonl";
    pub const REDB_PATH: &str = "./data/devices.redb";
    pub const API_PREFIX: &str = "/api";
    pub const API_HOST: &str = "127.0.0.1";
    pub const API_PORT: u16 = 8080;
}

/// Environment variable names.
pub mod env_vars {
    pub const MQTT_BROKER: &str = "MQTT_BROKER";
    pub const MQTT_PORT: &str = "MQTT_PORT";
    pub const MQTT_USERNAME: &str = "MQTT_USERNAME";
    pub const MQTT_PASSWORD: &str = "MQTT_PASSWORD";
    pub const MQTT_CLIENT_ID: &str = "MQTT_CLIENT_ID";
    pub const MQTT_DATA_TOPIC: &str = "MQTT_DATA_TOPIC";
    pub const MQTT_CONTROL_TOPIC: &str = "MQTT_CONTROL_TOPIC";
    pub const MQTT_SUBSCRIBE_QOS: &str = "MQTT_SUBSCRIBE_QOS";
    pub const MQTT_PUBLISH_QOS: &str = "MQTT_PUBLISH_QOS";
    pub const MQTT_CONNECT_TIMEOUT: &str = "MQTT_CONNECT_TIMEOUT";
    /// Seconds to wait for a device to answer a command.
    pub const MQTT_WAIT_TIMEOUT: &str = "MQTT_WAIT_TIMEOUT";
    pub const SYNC_WINDOW_SECS: &str = "SYNC_WINDOW_SECS";
    pub const CRON_LISTEN_DURATION: &str = "CRON_LISTEN_DURATION";
    pub const STORAGE_BACKEND: &str = "STORAGE_BACKEND";
    pub const STORAGE_PATH: &str = "STORAGE_PATH";
    pub const DEVICE_LOG_FILE: &str = "DEVICE_LOG_FILE";
    pub const API_PREFIX: &str = "API_PREFIX";
    /// `true` switches log output to JSON lines.
    pub const LOG_JSON: &str = "TELEBRIDGE_LOG_JSON";
}

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    /// Prefix for generated client ids; every session appends a random suffix.
    pub client_id_prefix: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    pub connect_timeout_secs: u64,
    /// Bound on waiting for the broker to acknowledge a QoS 1/2 publish.
    pub publish_ack_timeout_ms: u64,
    /// Capacity of the inbound message channel of a session.
    pub channel_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: defaults::BROKER.to_string(),
            port: defaults::PORT,
            client_id_prefix: defaults::CLIENT_ID_PREFIX.to_string(),
            username: None,
            password: None,
            keep_alive_secs: defaults::KEEP_ALIVE_SECS,
            connect_timeout_secs: defaults::CONNECT_TIMEOUT_SECS,
            publish_ack_timeout_ms: defaults::PUBLISH_ACK_TIMEOUT_MS,
            channel_capacity: defaults::CHANNEL_CAPACITY,
        }
    }
}

impl MqttConfig {
    /// Get the full broker address.
    pub fn broker_addr(&self) -> String {
        format!("{}:{}", self.broker, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn publish_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_ack_timeout_ms)
    }
}

/// Topic layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    /// Shared telemetry topic (may contain wildcards).
    pub data_topic: String,
    /// Root under which `<root>/<device_id>` control topics live.
    pub control_root: String,
    pub subscribe_qos: Qos,
    pub publish_qos: Qos,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            data_topic: defaults::DATA_TOPIC.to_string(),
            control_root: defaults::CONTROL_TOPIC.to_string(),
            subscribe_qos: Qos::AtLeastOnce,
            publish_qos: Qos::AtLeastOnce,
        }
    }
}

/// Listen-window durations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Window opened by every read request.
    pub window_secs: u64,
    /// Window opened by the periodic (cron) trigger.
    pub cron_window_secs: u64,
    /// How long a command waits for the device to report back.
    pub ack_timeout_secs: u64,
    /// Open a refresh window before every read. When false, reads serve
    /// whatever the periodic sync last stored.
    pub sync_on_read: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            window_secs: defaults::WINDOW_SECS,
            cron_window_secs: defaults::CRON_WINDOW_SECS,
            ack_timeout_secs: defaults::ACK_TIMEOUT_SECS,
            sync_on_read: true,
        }
    }
}

impl SyncConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn cron_window(&self) -> Duration {
        Duration::from_secs(self.cron_window_secs)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }
}

/// Persistence backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    /// Process-local map, lost on restart.
    Memory,
    /// Keyed redb database, one entry per device.
    Redb,
    /// Append-only JSON-lines file.
    Log,
}

impl FromStr for StorageBackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redb" | "kv" => Ok(Self::Redb),
            "log" | "file" | "jsonl" => Ok(Self::Log),
            other => Err(Error::Config(format!(
                "Unknown storage backend: {}. Available backends: memory, redb, log",
                other
            ))),
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackendKind,
    /// File path for the redb and log backends. Falls back to the backend default.
    pub path: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendKind::Log,
            path: None,
        }
    }
}

impl StorageConfig {
    /// Effective path for file-backed stores.
    pub fn resolved_path(&self) -> String {
        match (&self.path, self.backend) {
            (Some(path), _) => path.clone(),
            (None, StorageBackendKind::Redb) => defaults::REDB_PATH.to_string(),
            (None, _) => defaults::LOG_FILE.to_string(),
        }
    }
}

/// HTTP surface settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub prefix: String,
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            prefix: defaults::API_PREFIX.to_string(),
            host: defaults::API_HOST.to_string(),
            port: defaults::API_PORT,
        }
    }
}

/// Complete bridge configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub mqtt: MqttConfig,
    pub topics: TopicConfig,
    pub sync: SyncConfig,
    pub storage: StorageConfig,
    pub api: ApiConfig,
}

impl BridgeConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Override fields from an environment lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| -> Option<String> {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get(env_vars::MQTT_BROKER) {
            self.mqtt.broker = v;
        }
        if let Some(v) = parse_num(env_vars::MQTT_PORT, get(env_vars::MQTT_PORT))? {
            self.mqtt.port = v;
        }
        if let Some(v) = get(env_vars::MQTT_USERNAME) {
            self.mqtt.username = Some(v);
        }
        if let Some(v) = get(env_vars::MQTT_PASSWORD) {
            self.mqtt.password = Some(v);
        }
        if let Some(v) = get(env_vars::MQTT_CLIENT_ID) {
            self.mqtt.client_id_prefix = v;
        }
        if let Some(v) = parse_num(
            env_vars::MQTT_CONNECT_TIMEOUT,
            get(env_vars::MQTT_CONNECT_TIMEOUT),
        )? {
            self.mqtt.connect_timeout_secs = v;
        }
        if let Some(v) = get(env_vars::MQTT_DATA_TOPIC) {
            self.topics.data_topic = v;
        }
        if let Some(v) = get(env_vars::MQTT_CONTROL_TOPIC) {
            self.topics.control_root = v;
        }
        if let Some(v) = parse_num::<u8>(
            env_vars::MQTT_SUBSCRIBE_QOS,
            get(env_vars::MQTT_SUBSCRIBE_QOS),
        )? {
            self.topics.subscribe_qos = Qos::try_from(v)?;
        }
        if let Some(v) = parse_num::<u8>(env_vars::MQTT_PUBLISH_QOS, get(env_vars::MQTT_PUBLISH_QOS))? {
            self.topics.publish_qos = Qos::try_from(v)?;
        }
        if let Some(v) = parse_num(env_vars::MQTT_WAIT_TIMEOUT, get(env_vars::MQTT_WAIT_TIMEOUT))? {
            self.sync.ack_timeout_secs = v;
        }
        if let Some(v) = parse_num(env_vars::SYNC_WINDOW_SECS, get(env_vars::SYNC_WINDOW_SECS))? {
            self.sync.window_secs = v;
        }
        if let Some(v) = parse_num(
            env_vars::CRON_LISTEN_DURATION,
            get(env_vars::CRON_LISTEN_DURATION),
        )? {
            self.sync.cron_window_secs = v;
        }
        if let Some(v) = get(env_vars::STORAGE_BACKEND) {
            self.storage.backend = v.parse()?;
        }
        // The log file variable only applies to the log backend.
        if let Some(v) = get(env_vars::STORAGE_PATH) {
            self.storage.path = Some(v);
        } else if let Some(v) = get(env_vars::DEVICE_LOG_FILE) {
            if self.storage.backend == StorageBackendKind::Log {
                self.storage.path = Some(v);
            }
        }
        if let Some(v) = get(env_vars::API_PREFIX) {
            self.api.prefix = v;
        }

        Ok(())
    }

    /// Reject settings the bridge cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.mqtt.broker.trim().is_empty() {
            return Err(Error::Config("mqtt.broker must not be empty".to_string()));
        }
        if self.mqtt.port == 0 {
            return Err(Error::Config("mqtt.port must not be 0".to_string()));
        }
        if self.mqtt.connect_timeout_secs == 0 {
            return Err(Error::Config("mqtt.connect_timeout_secs must be positive".to_string()));
        }
        if self.mqtt.channel_capacity == 0 {
            return Err(Error::Config("mqtt.channel_capacity must be positive".to_string()));
        }
        if self.topics.data_topic.trim().is_empty() {
            return Err(Error::Config("topics.data_topic must not be empty".to_string()));
        }
        let control = self.topics.control_root.trim();
        if control.is_empty() || control.contains(['+', '#']) {
            return Err(Error::Config(format!(
                "topics.control_root '{}' must be a non-empty topic without wildcards",
                self.topics.control_root
            )));
        }
        if self.sync.window_secs == 0 || self.sync.cron_window_secs == 0 {
            return Err(Error::Config("sync windows must be positive".to_string()));
        }
        if self.sync.ack_timeout_secs == 0 {
            return Err(Error::Config("sync.ack_timeout_secs must be positive".to_string()));
        }
        if !self.api.prefix.starts_with('/') {
            return Err(Error::Config(format!(
                "api.prefix '{}' must start with '/'",
                self.api.prefix
            )));
        }
        Ok(())
    }
}

fn parse_num<T: FromStr>(name: &str, value: Option<String>) -> Result<Option<T>> {
    value
        .map(|v| {
            v.parse::<T>()
                .map_err(|_| Error::Config(format!("{} has an invalid value: {}", name, v)))
        })
        .transpose()
}
