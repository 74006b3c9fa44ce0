use axum::{extract::State, Json};
use std::sync::Arc;

use super::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let manager = &state.manager;
    Json(serde_json::json!({
        "status": "ok",
        "default_owner": manager.default_owner(),
        "schemas": manager.schemas().names().len(),
        "embedding_enabled": manager.embedding_enabled(),
        "started_at": state.started_at.to_rfc3339(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
