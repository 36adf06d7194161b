use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use paygate::CreateIntentRequest;

use crate::error::ApiResult;
use crate::handlers::AppState;

/// Wire shape of an intent
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentJson {
    pub id: i64,
    pub amount_sats: i64,
    pub status: String,
    pub address_id: Option<i64>,
    pub required_confs: i32,
    pub expires_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub email: Option<String>,
    pub memo: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<paygate::infrastructure::persistence::entities::payment_intents::Model> for IntentJson {
    fn from(
        model: paygate::infrastructure::persistence::entities::payment_intents::Model,
    ) -> Self {
        Self {
            id: model.id,
            amount_sats: model.amount_sats,
            status: model.status,
            address_id: model.address_id,
            required_confs: model.required_confs,
            expires_at: model.expires_at,
            confirmed_at: model.confirmed_at,
            email: model.email,
            memo: model.memo,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Handler for POST /intents
pub async fn create_intent(
    State(state): State<AppState>,
    Json(request): Json<CreateIntentRequest>,
) -> ApiResult<(StatusCode, Json<IntentJson>)> {
    let intent = state.service.create_intent(request).await?;
    Ok((StatusCode::CREATED, Json(intent.into())))
}

/// Handler for GET /intents/{id}
pub async fn get_intent(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<IntentJson>> {
    let intent = state.service.get_intent(id).await?;
    Ok(Json(intent.into()))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MagicLinkRequest {
    #[serde(default)]
    pub ttl_hours: Option<i64>,
}

/// Handler for POST /intents/{id}/magic-link
pub async fn issue_magic_link(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Option<Json<MagicLinkRequest>>,
) -> ApiResult<Json<paygate::IssuedToken>> {
    let ttl_hours = body.and_then(|Json(req)| req.ttl_hours);
    let issued = state
        .service
        .issue_token(id, ttl_hours.map(|h| h * 3600))
        .await?;
    Ok(Json(issued))
}
