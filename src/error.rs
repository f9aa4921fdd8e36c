//! Application error taxonomy.
//!
//! Every endpoint failure serializes to the uniform envelope
//! `{ "success": false, "message": "..." }`. Ownership mismatches are
//! deliberately indistinguishable from missing resources (404, never 403).
//! Internal failures log full detail server-side and return a generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("Authentication token not provided")]
    TokenMissing,
    #[error("Invalid or expired token")]
    TokenInvalid,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Too many requests, please try again later")]
    RateLimited,
    #[error("Search is currently unavailable")]
    SearchUnavailable,
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

/// Uniform error envelope.
#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::TokenMissing | AppError::TokenInvalid | AppError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::SearchUnavailable | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(ref err) = self {
            tracing::error!(error = %err, "internal server error");
        }
        let body = ErrorBody {
            success: false,
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership_mismatch_is_not_found() {
        // Both "missing" and "foreign" are represented as NotFound: a 404,
        // never a 403, so existence does not leak.
        assert_eq!(AppError::NotFound("File").status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn internal_message_is_generic() {
        let err = AppError::Internal(anyhow::anyhow!("connection refused to 10.0.0.5:5432"));
        assert_eq!(err.to_string(), "Internal server error");
    }

    #[test]
    fn search_unavailable_is_distinguishable() {
        let err = AppError::SearchUnavailable;
        assert!(err.to_string().contains("Search"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
