//! API error taxonomy mapped to HTTP statuses with JSON bodies.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::download_manager::DownloadError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Plan expired")]
    PlanExpired,
    #[error("{0}")]
    NotFound(String),
    #[error("Download not available")]
    NotAvailable,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::PlanExpired => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::NotAvailable => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::Internal(err) => {
                error!("Internal error: {err:#}");
                "Internal server error".to_owned()
            }
            other => other.to_string(),
        };
        (self.status_code(), Json(json!({ "error": message }))).into_response()
    }
}

impl From<DownloadError> for ApiError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::SerialNotFound => ApiError::NotFound("Serial not found".to_owned()),
            DownloadError::NotAvailable => ApiError::NotAvailable,
            DownloadError::Internal(err) => ApiError::Internal(err),
        }
    }
}
