use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::handlers::AppState;

/// Handler for GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "watcher": if state.service.watcher_running().await { "running" } else { "stopped" },
    }))
}
