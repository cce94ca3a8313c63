//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use keyway_core::auth::{MintError, TokenError};
use keyway_core::handoff::HandoffError;
use keyway_core::redirect::RedirectError;
use keyway_core::session::SessionError;
use thiserror::Error;
use tracing::error;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
///
/// Protocol outcomes (stale state, upstream failures) are redirects chosen
/// by the services and never reach this type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("{0}")]
    Token(#[from] TokenError),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Ticket unavailable: {0}")]
    TicketUnavailable(String),

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.as_str()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.as_str()),
            AppError::Token(e) => {
                let kind = e.kind();
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(ErrorResponse {
                        error: kind.to_string(),
                        message: e.to_string(),
                    }),
                )
                    .into_response();
            }
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, "forbidden", m.as_str()),
            AppError::TicketUnavailable(m) => (StatusCode::GONE, "ticket_unavailable", m.as_str()),
            AppError::Internal(detail) => {
                error!(detail = %detail, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<MintError> for AppError {
    fn from(e: MintError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<RedirectError> for AppError {
    fn from(e: RedirectError) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl From<HandoffError> for AppError {
    fn from(e: HandoffError) -> Self {
        match e {
            HandoffError::UnknownCode | HandoffError::Expired => {
                AppError::TicketUnavailable(e.to_string())
            }
            HandoffError::WrongProduct => AppError::Forbidden(e.to_string()),
            HandoffError::NotConfigured(_) => AppError::Unauthorized(e.to_string()),
            HandoffError::Signing(_) | HandoffError::Upstream { .. } => {
                AppError::Internal(e.to_string())
            }
        }
    }
}
