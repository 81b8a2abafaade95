use super::registry::SessionRegistry;
use crate::error::RelayError;
use crate::publisher::AudioPublisher;
use crate::session::{SessionConfig, SessionStats};
use crate::transport::Connector;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Reason code reported for a failed start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The device could not be reached or refused to stream
    ConnectionFailed,
    /// Anything unexpected inside the start path
    Exception,
}

impl FailureReason {
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::ConnectionFailed => "connection_failed",
            FailureReason::Exception => "exception",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Failed `start_session`, as surfaced to the command layer
#[derive(Debug, Clone, thiserror::Error)]
#[error("{reason}: {message}")]
pub struct StartFailure {
    pub reason: FailureReason,
    pub message: String,
}

impl StartFailure {
    fn from_error(host: &str, err: &RelayError) -> Self {
        if err.is_connection_failure() {
            Self {
                reason: FailureReason::ConnectionFailed,
                message: format!("Failed to connect to {}: {}", host, err),
            }
        } else {
            Self {
                reason: FailureReason::Exception,
                message: err.to_string(),
            }
        }
    }
}

/// Entry point for the command layer
///
/// Translates start/stop/audio commands into registry calls. Inbound device
/// audio reaches the publisher given at construction.
#[derive(Clone)]
pub struct RelayFacade {
    registry: Arc<SessionRegistry>,
}

impl RelayFacade {
    pub fn new(
        connector: Arc<dyn Connector>,
        publisher: Arc<dyn AudioPublisher>,
        config: SessionConfig,
    ) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new(connector, publisher, config)),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Start (or restart) the session for `device_id`
    ///
    /// Runs on its own task so a panic in the start path becomes an
    /// `exception` failure instead of unwinding into the caller.
    pub async fn start_session(&self, device_id: &str, host: &str) -> Result<(), StartFailure> {
        info!(%device_id, %host, "start requested");

        let registry = Arc::clone(&self.registry);
        let (task_device, task_host) = (device_id.to_string(), host.to_string());
        let outcome =
            tokio::spawn(async move { registry.start_session(&task_device, &task_host).await })
                .await;

        match outcome {
            Ok(Ok(())) => {
                info!(%device_id, "session started");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(%device_id, %host, "session failed to start: {}", e);
                Err(StartFailure::from_error(host, &e))
            }
            Err(join_error) => {
                error!(%device_id, "start task failed: {}", join_error);
                Err(StartFailure {
                    reason: FailureReason::Exception,
                    message: join_error.to_string(),
                })
            }
        }
    }

    /// Stop the session for `device_id`; always succeeds
    pub async fn stop_session(&self, device_id: &str) {
        info!(%device_id, "stop requested");
        self.registry.stop_session(device_id).await;
    }

    /// Forward client audio; returns whether it was queued for the device
    pub async fn submit_client_audio(&self, device_id: &str, audio: Bytes) -> bool {
        match self.registry.submit_client_audio(device_id, audio).await {
            Ok(()) => true,
            Err(e) => {
                debug!(%device_id, "client audio dropped: {}", e);
                false
            }
        }
    }

    /// Decode base64 client audio and forward it
    pub async fn submit_client_audio_base64(&self, device_id: &str, encoded: &str) -> bool {
        match base64::engine::general_purpose::STANDARD.decode(encoded) {
            Ok(audio) => self.submit_client_audio(device_id, Bytes::from(audio)).await,
            Err(e) => {
                warn!(%device_id, "{}", RelayError::from(e));
                false
            }
        }
    }

    pub async fn session_stats(&self, device_id: &str) -> Option<SessionStats> {
        self.registry.stats(device_id).await
    }

    pub async fn active_devices(&self) -> Vec<String> {
        self.registry.active_devices().await
    }

    /// Stop every session
    pub async fn shutdown(&self) {
        info!("stopping all relay sessions");
        self.registry.stop_all().await;
    }
}
