//! Service error taxonomy.
//!
//! Expected auth outcomes (bad password, invalid token, conflict) are
//! ordinary `Err` values the transport layer maps to client-facing
//! responses; `Database`/`Internal`/`Config` are infrastructure
//! failures. Credential and token failures carry deliberately vague
//! messages so responses do not reveal whether an account exists or
//! why a token was rejected.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::dtos::ErrorResponse;
use crate::services::token::TokenError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Validation failed")]
    Validation(Vec<String>),

    #[error("Invalid credentials")]
    Credential,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    State(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Database error: {0}")]
    Database(anyhow::Error),

    #[error("Email error: {0}")]
    Email(String),

    #[error("Configuration error: {0}")]
    Config(anyhow::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Single-message validation failure.
    pub fn validation(msg: impl Into<String>) -> Self {
        ServiceError::Validation(vec![msg.into()])
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        ServiceError::Database(anyhow::Error::new(err))
    }
}

impl From<sqlx::migrate::MigrateError> for ServiceError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        ServiceError::Database(anyhow::Error::new(err))
    }
}

impl From<lettre::error::Error> for ServiceError {
    fn from(err: lettre::error::Error) -> Self {
        ServiceError::Email(err.to_string())
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::Internal(anyhow::Error::new(err))
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, error, details) = match self {
            ServiceError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Validation failed".to_string(),
                Some(errors),
            ),
            ServiceError::Credential => {
                (StatusCode::UNAUTHORIZED, self.to_string(), None)
            }
            // All token failures collapse to one generic class at the
            // HTTP boundary; the internal reason is already logged.
            ServiceError::Token(_) => (
                StatusCode::UNAUTHORIZED,
                "Invalid or expired token".to_string(),
                None,
            ),
            ServiceError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string(), None),
            ServiceError::Conflict(msg) => (StatusCode::CONFLICT, msg, None),
            ServiceError::State(msg) => (StatusCode::FORBIDDEN, msg, None),
            ServiceError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            ServiceError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, None),
            ServiceError::Database(err) => {
                tracing::error!(error = %err, "database failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
            ServiceError::Email(err) => {
                tracing::error!(error = %err, "email failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
            ServiceError::Config(err) => {
                tracing::error!(error = %err, "configuration failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
            ServiceError::Internal(err) => {
                tracing::error!(error = %err, "internal failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
        };

        (status, Json(ErrorResponse { error, details })).into_response()
    }
}
