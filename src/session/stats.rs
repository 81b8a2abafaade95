use super::state::SessionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Live packet counters, shared with the session's tasks
#[derive(Debug, Default)]
pub(crate) struct SessionCounters {
    pub audio_sent: AtomicU64,
    pub audio_received: AtomicU64,
    pub audio_published: AtomicU64,
    pub inbound_dropped: AtomicU64,
    pub outbound_dropped: AtomicU64,
    pub write_errors: AtomicU64,
    pub publish_errors: AtomicU64,
}

impl SessionCounters {
    pub fn bump(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Snapshot of a relay session for diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub device_id: String,

    /// Unique id of this session instance
    pub session_id: Uuid,

    pub host: String,
    pub port: u16,
    pub state: SessionState,

    /// When the session was created
    pub started_at: DateTime<Utc>,

    /// Client audio packets submitted (delivered or not)
    pub audio_sent: u64,

    /// Device audio packets observed (delivered or not)
    pub audio_received: u64,

    /// Device audio packets handed to the publish capability
    pub audio_published: u64,

    /// Device packets dropped because the session was not active or the queue was full
    pub inbound_dropped: u64,

    /// Client packets dropped before reaching the socket
    pub outbound_dropped: u64,

    pub write_errors: u64,
    pub publish_errors: u64,
}
