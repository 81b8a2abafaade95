use anyhow::Result;
use bytes::Bytes;

/// Downstream consumer of device audio
///
/// Implementations:
/// - `NatsPublisher`: one JSON message per frame on a per-device subject
#[async_trait::async_trait]
pub trait AudioPublisher: Send + Sync {
    /// Deliver one inbound audio frame for `device_id`
    async fn publish(&self, device_id: &str, audio: Bytes) -> Result<()>;
}
