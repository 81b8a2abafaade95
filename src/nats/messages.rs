use serde::{Deserialize, Serialize};

/// Device audio event published to NATS, one per inbound frame
#[derive(Debug, Serialize, Deserialize)]
pub struct AudioEventMessage {
    pub device_id: String,
    pub audio: String,  // Base64-encoded audio bytes
    pub sequence: u64,
    pub timestamp: String,  // RFC3339 timestamp
}
