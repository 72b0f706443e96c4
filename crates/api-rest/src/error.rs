//! REST error mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hc_core::{ErrorCategory, MedicalError};
use serde::Serialize;
use utoipa::ToSchema;

/// Body returned with every error status.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct ErrorRes {
    pub error: String,
    pub category: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Misconfigured(String),
    #[error(transparent)]
    Medical(#[from] MedicalError),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, category, message) = match &self {
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized", self.to_string()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "malformed_input", self.to_string()),
            ApiError::Misconfigured(_) => {
                tracing::error!("REST API misconfigured: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Internal server error".to_string(),
                )
            }
            ApiError::Medical(e) => match e.category() {
                ErrorCategory::MalformedInput => {
                    (StatusCode::BAD_REQUEST, "malformed_input", e.to_string())
                }
                ErrorCategory::UnsupportedValue => {
                    (StatusCode::BAD_REQUEST, "unsupported_value", e.to_string())
                }
                ErrorCategory::PermissionDenied => {
                    (StatusCode::FORBIDDEN, "permission_denied", e.to_string())
                }
                ErrorCategory::NotFound => (StatusCode::NOT_FOUND, "not_found", e.to_string()),
                ErrorCategory::InvariantViolation => {
                    tracing::error!("invariant violation: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "invariant_violation",
                        "Internal server error".to_string(),
                    )
                }
                ErrorCategory::Storage => {
                    tracing::error!("storage error: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "storage",
                        "Internal server error".to_string(),
                    )
                }
            },
        };

        let body = Json(ErrorRes {
            error: message,
            category: category.to_string(),
        });
        (status, body).into_response()
    }
}
