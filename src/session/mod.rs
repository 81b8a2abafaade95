//! Relay session management
//!
//! This module provides the `RelaySession` abstraction that manages:
//! - The device transport lifecycle (connect, start/stop streaming, disconnect)
//! - The Idle -> Connecting -> Active -> Closing -> Closed state machine
//! - Ordered outbound audio writes through a bounded per-session queue
//! - Inbound audio delivery to the publish capability while active
//! - Per-direction packet counters for diagnostics

mod config;
mod session;
mod state;
mod stats;

pub use config::SessionConfig;
pub use session::RelaySession;
pub use state::SessionState;
pub use stats::SessionStats;
