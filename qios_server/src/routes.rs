//! Route configuration for the QIOS gateway

use axum::{routing::get, Router};

use crate::ws::{self, AppState};

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Persistent node/observer channel
        .route("/ws", get(ws::ws_handler))
        // Health check
        .route("/health", get(health_handler))
        .with_state(state)
}

pub async fn health_handler() -> &'static str {
    "OK"
}
