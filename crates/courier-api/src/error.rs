use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use courier_types::api::Envelope;

pub type ApiResult<T> = Result<T, ApiError>;

/// Component-level failure taxonomy. Every error surfaces with a
/// human-readable reason; none are silently swallowed.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed input; the caller's fault.
    #[error("{0}")]
    Validation(String),

    /// File type outside the configured MIME policy.
    #[error("Unsupported file type: {0}")]
    UnsupportedMediaType(String),

    /// Missing, invalid, or expired credentials.
    #[error("{0}")]
    Unauthenticated(String),

    /// Authenticated but not permitted.
    #[error("{0}")]
    Forbidden(String),

    /// Referenced entity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Uniqueness violation.
    #[error("{0}")]
    Conflict(String),

    /// The external blob-storage service failed.
    #[error("Upload failed: {0}")]
    Upload(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::UnsupportedMediaType(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Upload(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Internal(e) => {
                error!("internal error: {:#}", e);
                "Internal server error".to_string()
            }
            ApiError::Upload(_) => {
                error!("{}", self);
                self.to_string()
            }
            _ => self.to_string(),
        };
        (status, Json(Envelope::failure(message))).into_response()
    }
}

pub(crate) fn join_error(e: tokio::task::JoinError) -> ApiError {
    ApiError::Internal(anyhow::anyhow!("blocking task join error: {e}"))
}

/// Runs a blocking database closure off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(join_error)?
        .map_err(ApiError::from)
}
