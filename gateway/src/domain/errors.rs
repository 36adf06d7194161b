use thiserror::Error;

use crate::domain::services::descriptor::DescriptorError;
use crate::domain::services::token_codec::TokenCodecError;
use crate::infrastructure::bitcoin::NodeError;
use crate::infrastructure::persistence::DbError;

/// Domain error taxonomy surfaced by the core verbs. The HTTP adapter maps
/// each variant to a status code; internal subsystems log and confine most
/// of them instead.
#[derive(Debug, Error)]
pub enum PayError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("expired: {0}")]
    Expired(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("fatal: {0}")]
    Fatal(String),
}

pub type PayResult<T> = Result<T, PayError>;

impl From<DbError> for PayError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Connection(msg) => PayError::Transient(msg),
            DbError::Query(msg) => PayError::Transient(msg),
        }
    }
}

impl From<NodeError> for PayError {
    fn from(err: NodeError) -> Self {
        match err {
            NodeError::Transient(msg) => PayError::Transient(msg),
            NodeError::Fatal(msg) => PayError::Fatal(msg),
        }
    }
}

impl From<DescriptorError> for PayError {
    fn from(err: DescriptorError) -> Self {
        // A descriptor that stops parsing mid-flight is an operator error,
        // never something a retry can fix.
        PayError::Fatal(err.to_string())
    }
}

impl From<TokenCodecError> for PayError {
    fn from(err: TokenCodecError) -> Self {
        match err {
            TokenCodecError::Expired => PayError::Expired("token expired".to_string()),
            TokenCodecError::Malformed | TokenCodecError::BadSignature => {
                PayError::Auth("invalid token".to_string())
            }
        }
    }
}
