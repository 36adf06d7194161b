use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use paygate::PayError;

/// Error wrapper that maps the domain taxonomy onto HTTP statuses.
#[derive(Debug)]
pub enum ApiError {
    Pay(PayError),
    /// Magic-link failures deliberately collapse to one opaque message so
    /// callers cannot distinguish signature, row, and expiry failures.
    MagicLink,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<PayError> for ApiError {
    fn from(err: PayError) -> Self {
        ApiError::Pay(err)
    }
}

impl ApiError {
    /// Opaque variant for the /pay/:token surface. Backend outages still
    /// surface as 503 so the customer knows to retry.
    pub fn opaque_magic_link(err: PayError) -> Self {
        match err {
            PayError::Transient(_) => ApiError::Pay(err),
            _ => ApiError::MagicLink,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::MagicLink => (StatusCode::GONE, "Invalid or expired link".to_string()),
            ApiError::Pay(err) => match &err {
                PayError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
                PayError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
                PayError::InvalidState(msg) | PayError::Conflict(msg) => {
                    (StatusCode::CONFLICT, msg.clone())
                }
                PayError::Auth(msg) | PayError::Expired(msg) => (StatusCode::GONE, msg.clone()),
                PayError::Transient(msg) => {
                    tracing::warn!("transient failure surfaced to client: {}", msg);
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "backend temporarily unavailable".to_string(),
                    )
                }
                PayError::Fatal(msg) => {
                    tracing::error!("fatal error surfaced to client: {}", msg);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal error".to_string(),
                    )
                }
            },
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
