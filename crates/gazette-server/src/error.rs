//! Error handling for the HTTP surface.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gazette_relay::RelayError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::store::StoreError;

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// No valid `session` cookie.
    #[error("Not authenticated")]
    Unauthorized,

    /// Requested row does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Request failed validation.
    #[error("{0}")]
    BadRequest(String),

    /// Storage failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Relay failure.
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error flag.
    pub error: bool,
    /// Error code.
    pub code: &'static str,
    /// Human readable detail.
    pub detail: String,
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            AppError::Relay(_) => (StatusCode::SERVICE_UNAVAILABLE, "RELAY_ERROR"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            error!(code, error = %self, "request failed");
        }

        let body = ErrorResponse {
            error: true,
            code,
            detail: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(e) => AppError::Database(e),
            StoreError::Relay(e) => AppError::Relay(e),
            StoreError::InvalidIdentifier(name) => {
                AppError::Internal(format!("invalid identifier: {}", name))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::NotFound("Newsletter not found".into())
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::BadRequest("title must not be empty".into())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Relay(RelayError::AlreadyRunning)
                .into_response()
                .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_unauthorized_detail() {
        assert_eq!(AppError::Unauthorized.to_string(), "Not authenticated");
    }

    #[test]
    fn test_store_error_mapping() {
        let err = AppError::from(StoreError::InvalidIdentifier("bad name".into()));
        assert!(matches!(err, AppError::Internal(_)));

        let err = AppError::from(StoreError::Relay(RelayError::SourceUnavailable("x".into())));
        assert!(matches!(err, AppError::Relay(_)));
    }
}
