use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use gatehouse::core::error::FailureClass;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Database unavailable")]
    DbUnavailable,

    #[error("Internal server error")]
    Internal,
}

impl From<gatehouse::Error> for ApiError {
    fn from(err: gatehouse::Error) -> Self {
        // Raw detail stays in the logs; the caller gets a generic message.
        match err.classify() {
            FailureClass::DbUnavailable => {
                tracing::error!(error = %err, "Database unavailable");
                ApiError::DbUnavailable
            }
            FailureClass::Unexpected => {
                tracing::error!(error = %err, "Unexpected error in auth flow");
                ApiError::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized!"),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden!"),
            ApiError::BadRequest(ref msg) => (StatusCode::BAD_REQUEST, msg.as_str()),
            ApiError::DbUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Unable to connect to the database. Please try again later.",
            ),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An unexpected error occurred. Try again!",
            ),
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
