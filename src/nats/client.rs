use super::messages::AudioEventMessage;
use crate::publisher::AudioPublisher;
use anyhow::{Context, Result};
use async_nats::Client;
use base64::Engine;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, trace};

/// Default subject prefix; events go to `<prefix>.<device_id>`
pub const DEFAULT_SUBJECT_PREFIX: &str = "intercom.audio";

/// Publishes device audio to NATS
pub struct NatsPublisher {
    client: Client,
    subject_prefix: String,
    sequence: AtomicU64,
}

impl NatsPublisher {
    /// Connect to NATS server
    pub async fn connect(url: &str, subject_prefix: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self::with_client(client, subject_prefix))
    }

    pub fn with_client(client: Client, subject_prefix: &str) -> Self {
        let subject_prefix = if subject_prefix.is_empty() {
            DEFAULT_SUBJECT_PREFIX
        } else {
            subject_prefix.trim_end_matches('.')
        };

        Self {
            client,
            subject_prefix: subject_prefix.to_string(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn subject_for(&self, device_id: &str) -> String {
        subject_for(&self.subject_prefix, device_id)
    }
}

#[async_trait::async_trait]
impl AudioPublisher for NatsPublisher {
    async fn publish(&self, device_id: &str, audio: Bytes) -> Result<()> {
        let subject = self.subject_for(device_id);
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);

        let message = AudioEventMessage {
            device_id: device_id.to_string(),
            audio: base64::engine::general_purpose::STANDARD.encode(&audio),
            sequence,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        let payload = serde_json::to_vec(&message)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish audio event")?;

        trace!(%subject, sequence, bytes = audio.len(), "published audio event");

        Ok(())
    }
}

/// NATS subject for a device; tokens NATS treats specially are replaced
pub fn subject_for(prefix: &str, device_id: &str) -> String {
    let token: String = device_id
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' | ' ' => '_',
            c => c,
        })
        .collect();
    format!("{}.{}", prefix, token)
}
