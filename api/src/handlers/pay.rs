use axum::{
    extract::{Path, State},
    Json,
};

use paygate::AssignedDetails;

use crate::error::{ApiError, ApiResult};
use crate::handlers::AppState;

/// Handler for GET /pay/{token}, the magic-link landing data. All
/// rejection reasons collapse to one opaque error.
pub async fn redeem_magic_link(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Json<AssignedDetails>> {
    let details = state
        .service
        .redeem_magic_link(&token)
        .await
        .map_err(ApiError::opaque_magic_link)?;
    Ok(Json(details))
}
