use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::error::ApiResult;
use crate::handlers::AppState;

/// Handler for POST /scan/{intentId}: force a pull-path reconciliation.
/// Returns 503 while the watcher is not running.
pub async fn scan_intent(
    State(state): State<AppState>,
    Path(intent_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    state.service.scan_for_payments(intent_id).await?;
    Ok(Json(json!({ "success": true })))
}
