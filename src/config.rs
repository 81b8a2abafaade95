use crate::directory::DeviceInfo;
use crate::nats::client::DEFAULT_SUBJECT_PREFIX;
use crate::protocol::{DEFAULT_DEVICE_PORT, DEFAULT_MAX_PAYLOAD};
use crate::session::SessionConfig;
use crate::transport::TransportConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    pub nats: NatsConfig,
    #[serde(default)]
    pub devices: Vec<DeviceInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub handshake_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub max_payload: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_DEVICE_PORT,
            connect_timeout_ms: 5000,
            handshake_timeout_ms: 5000,
            write_timeout_ms: 2000,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub inbound_queue_depth: usize,
    pub outbound_queue_depth: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            inbound_queue_depth: session.inbound_queue_depth,
            outbound_queue_depth: session.outbound_queue_depth,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NatsConfig {
    pub url: String,
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_subject_prefix() -> String {
    DEFAULT_SUBJECT_PREFIX.to_string()
}

impl Config {
    /// Load `path` (extension optional) overlaid with `INTERCOM__*` env vars
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("INTERCOM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read config from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.service.http.bind, self.service.http.port)
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout: Duration::from_millis(self.device.connect_timeout_ms),
            handshake_timeout: Duration::from_millis(self.device.handshake_timeout_ms),
            write_timeout: Duration::from_millis(self.device.write_timeout_ms),
            max_payload: self.device.max_payload,
            ..TransportConfig::default()
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            device_port: self.device.port,
            inbound_queue_depth: self.relay.inbound_queue_depth,
            outbound_queue_depth: self.relay.outbound_queue_depth,
        }
    }
}
