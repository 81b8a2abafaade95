use crate::session::SessionState;
use std::time::Duration;
use thiserror::Error;

/// Failures raised by the transport and session layers
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out connecting to {addr} after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("start_stream handshake failed: {0}")]
    Handshake(String),

    #[error("device did not acknowledge start_stream within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("audio write failed: {0}")]
    Write(#[source] std::io::Error),

    #[error("session is not active")]
    NotActive,

    #[error("no session for device {0}")]
    UnknownDevice(String),

    #[error("outbound audio queue is full")]
    Backpressure,

    #[error("session cannot start from {0} state")]
    InvalidState(SessionState),

    #[error("transport disconnected")]
    Disconnected,

    #[error("session start cancelled")]
    Cancelled,

    #[error("invalid client audio payload: {0}")]
    Decode(#[from] base64::DecodeError),
}

impl RelayError {
    /// True for errors that mean the device could not be reached or refused to stream
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            RelayError::Connect { .. }
                | RelayError::ConnectTimeout { .. }
                | RelayError::Handshake(_)
                | RelayError::HandshakeTimeout(_)
                | RelayError::Disconnected
                | RelayError::Cancelled
        )
    }
}

pub type RelayResult<T> = Result<T, RelayError>;
