use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::repositories::account_repository::RepositoryError;
use crate::services::identity_service::IdentityError;
use crate::services::otp_service::OtpError;

// Type alias for Result with our AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Request-level error taxonomy. Validation messages are safe to surface
/// verbatim; store and oracle failures are logged with detail server-side
/// and collapsed to a generic message for the client.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Email is already registered. Please log in instead")]
    AlreadyRegistered,

    #[error("Email not found or OTP is invalid")]
    InvalidOtp,

    #[error("OTP has expired. Please request a new code")]
    OtpExpired,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Upstream failure: {0}")]
    Upstream(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::AlreadyRegistered
            | AppError::InvalidOtp
            | AppError::OtpExpired => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Database(e) => {
                tracing::error!("database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error occurred".to_string(),
                )
            }
            AppError::Upstream(e) => {
                tracing::error!("upstream failure: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error occurred".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Database(e) => AppError::Database(e),
            RepositoryError::NotFound => {
                AppError::NotFound("Account not found".to_string())
            }
            RepositoryError::AlreadyExists => AppError::AlreadyRegistered,
        }
    }
}

impl From<OtpError> for AppError {
    fn from(err: OtpError) -> Self {
        match err {
            OtpError::Validation(msg) => AppError::Validation(msg),
            OtpError::AlreadyRegistered => AppError::AlreadyRegistered,
            OtpError::AccountNotFound => {
                AppError::NotFound("Account not found".to_string())
            }
            OtpError::InvalidOtp => AppError::InvalidOtp,
            OtpError::Expired => AppError::OtpExpired,
            OtpError::Repository(RepositoryError::Database(e)) => AppError::Database(e),
            OtpError::Repository(other) => AppError::from(other),
            OtpError::Oracle(e) => AppError::Upstream(anyhow::Error::new(e)),
        }
    }
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        AppError::Upstream(anyhow::Error::new(err))
    }
}
