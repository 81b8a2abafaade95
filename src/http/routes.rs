use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session control
        .route("/intercom/start", post(handlers::start_session))
        .route("/intercom/stop", post(handlers::stop_session))
        .route("/intercom/audio", post(handlers::submit_audio))
        // Queries
        .route("/intercom/devices", get(handlers::list_devices))
        .route(
            "/intercom/sessions/:device_id",
            get(handlers::get_session_stats),
        )
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
