//! Subscription API Error Types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Errors returned synchronously by the subscription endpoints.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// Malformed or incomplete subscribe request.
    #[error("{0}")]
    Validation(String),

    /// No subscription for the given agent.
    #[error("Subscription not found")]
    NotFound,
}

/// Error response body for JSON responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

impl IntoResponse for SubscriptionError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Self::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        };

        let body = Json(ErrorResponse {
            error: code,
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

/// Result type for subscription handlers.
pub type SubscriptionResult<T> = Result<T, SubscriptionError>;
