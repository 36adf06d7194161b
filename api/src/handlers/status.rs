use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use paygate::StatusView;

use crate::error::ApiResult;
use crate::handlers::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    pub intent_id: i64,
}

/// Handler for GET /status?intentId=…
pub async fn intent_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<StatusView>> {
    let status = state.service.get_status(query.intent_id).await?;
    Ok(Json(status))
}
