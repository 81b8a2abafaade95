//! HTTP command API for intercom clients
//!
//! This module provides a REST API for controlling relay sessions:
//! - POST /intercom/start - Start (or replace) a device session
//! - POST /intercom/stop - Stop a device session
//! - POST /intercom/audio - Submit base64 client audio
//! - GET /intercom/devices - List intercom-capable devices
//! - GET /intercom/sessions/:device_id - Session diagnostics
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{AudioRequest, StartRequest, StopRequest};
pub use routes::create_router;
pub use state::AppState;
