use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use cinder_engine::PasteError;
use cinder_types::api::ErrorBody;

#[derive(Debug)]
pub enum ApiError {
    Paste(PasteError),
    /// Bearer token missing on an owner-only route, or present but invalid.
    Unauthorized,
    BadRequest(String),
}

impl From<PasteError> for ApiError {
    fn from(err: PasteError) -> Self {
        Self::Paste(err)
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        error!("spawn_blocking join error: {}", err);
        Self::Paste(PasteError::Internal(anyhow::anyhow!("worker task failed")))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Paste(err) => match err {
                PasteError::NotFound => StatusCode::NOT_FOUND,
                PasteError::Gone | PasteError::SourceExpired => StatusCode::GONE,
                PasteError::Forbidden => StatusCode::FORBIDDEN,
                PasteError::MissingCredential | PasteError::DecryptionFailed => StatusCode::UNAUTHORIZED,
                PasteError::Conflict(_) => StatusCode::CONFLICT,
                PasteError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                PasteError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, retryable) = match &self {
            Self::Unauthorized => ("invalid or missing bearer token".to_string(), false),
            Self::BadRequest(msg) => (msg.clone(), false),
            Self::Paste(PasteError::Internal(e)) => {
                error!("Internal error: {:#}", e);
                ("internal error".to_string(), false)
            }
            Self::Paste(err) => (err.to_string(), err.is_retryable()),
        };

        (status, Json(ErrorBody { error: message, retryable })).into_response()
    }
}
