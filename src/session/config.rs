use crate::protocol::DEFAULT_DEVICE_PORT;
use serde::{Deserialize, Serialize};

/// Configuration shared by every relay session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Device port used when the host carries no explicit port
    pub device_port: u16,

    /// Inbound frames buffered for publishing before new ones are dropped
    pub inbound_queue_depth: usize,

    /// Client frames buffered for writing before new ones are rejected
    pub outbound_queue_depth: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_port: DEFAULT_DEVICE_PORT,
            inbound_queue_depth: 64,
            outbound_queue_depth: 64,
        }
    }
}
