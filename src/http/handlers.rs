use super::state::AppState;
use crate::directory::DeviceInfo;
use crate::relay::FailureReason;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::trace;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub device_id: String,

    /// Device address, optionally with `:port`
    pub host: String,
}

#[derive(Debug, Deserialize)]
pub struct StopRequest {
    pub device_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AudioRequest {
    pub device_id: String,

    /// Base64-encoded audio bytes
    pub audio: String,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct DevicesResponse {
    pub devices: Vec<DeviceInfo>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /intercom/start
/// Start a relay session, replacing any existing one for the device
pub async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartRequest>,
) -> impl IntoResponse {
    match state.relay.start_session(&req.device_id, &req.host).await {
        Ok(()) => (StatusCode::OK, Json(SuccessResponse { success: true })).into_response(),
        Err(failure) => {
            let status = match failure.reason {
                FailureReason::ConnectionFailed => StatusCode::BAD_GATEWAY,
                FailureReason::Exception => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                Json(ErrorResponse {
                    success: false,
                    code: failure.reason.code().to_string(),
                    message: failure.message,
                }),
            )
                .into_response()
        }
    }
}

/// POST /intercom/stop
/// Stop a relay session; succeeds even when none exists
pub async fn stop_session(
    State(state): State<AppState>,
    Json(req): Json<StopRequest>,
) -> impl IntoResponse {
    state.relay.stop_session(&req.device_id).await;
    (StatusCode::OK, Json(SuccessResponse { success: true }))
}

/// POST /intercom/audio
/// Fire-and-forget client audio; drops are logged, never reported
pub async fn submit_audio(
    State(state): State<AppState>,
    Json(req): Json<AudioRequest>,
) -> impl IntoResponse {
    let queued = state
        .relay
        .submit_client_audio_base64(&req.device_id, &req.audio)
        .await;
    trace!(device_id = %req.device_id, queued, "client audio submitted");
    StatusCode::ACCEPTED
}

/// GET /intercom/devices
/// List intercom-capable devices
pub async fn list_devices(State(state): State<AppState>) -> impl IntoResponse {
    Json(DevicesResponse {
        devices: state.directory.list_devices(),
    })
}

/// GET /intercom/sessions/:device_id
/// Diagnostics for a live session
pub async fn get_session_stats(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> impl IntoResponse {
    match state.relay.session_stats(&device_id).await {
        Some(stats) => (StatusCode::OK, Json(stats)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                success: false,
                code: "not_found".to_string(),
                message: format!("No session for device {}", device_id),
            }),
        )
            .into_response(),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
