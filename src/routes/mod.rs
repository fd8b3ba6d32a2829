use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;
use crate::websocket::handlers::ws_handler;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "realtime-messaging-service",
    }))
}
