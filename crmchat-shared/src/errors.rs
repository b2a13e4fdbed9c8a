use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::types::ApiErrorResponse;

/// Application error codes. Each code maps to exactly one HTTP status; the
/// code itself is never sent to the client, only the status and message.
/// Bad input and opaque failures use the `Validation` and `Internal` variants
/// of [`AppError`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Unauthorized,
    ConversationNotFound,
    NotConversationMember,
    ConversationCreateFailed,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotConversationMember => StatusCode::FORBIDDEN,
            Self::ConversationNotFound => StatusCode::NOT_FOUND,
            Self::ConversationCreateFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Known {
        code: ErrorCode,
        message: String,
        details: Option<String>,
    },

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("validation error: {0}")]
    Validation(String),
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(code: ErrorCode, message: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: Some(details.into()),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(ErrorCode::Unauthorized, "Authentication required.")
    }

    /// Caller is authenticated but not a participant of the conversation.
    pub fn access_denied() -> Self {
        Self::new(ErrorCode::NotConversationMember, "Access denied.")
    }

    pub fn conversation_not_found() -> Self {
        Self::new(ErrorCode::ConversationNotFound, "Conversation not found.")
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Known { code, .. } => code.status_code(),
            AppError::Database(diesel::result::Error::NotFound) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Internal(_) | AppError::Database(_) | AppError::Pool(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self {
            AppError::Known { code, message, details } => {
                if status.is_server_error() {
                    tracing::error!(?code, message = %message, details = ?details, "request failed");
                }
                let resp = ApiErrorResponse::new(message);
                match details {
                    Some(d) => resp.with_details(d),
                    None => resp,
                }
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                ApiErrorResponse::new("Internal server error.").with_details(err.to_string())
            }
            AppError::Database(diesel::result::Error::NotFound) => {
                ApiErrorResponse::new("Resource not found.")
            }
            AppError::Database(err) => {
                tracing::error!(error = %err, "database error");
                ApiErrorResponse::new("Database error.").with_details(err.to_string())
            }
            AppError::Pool(err) => {
                tracing::error!(error = %err, "connection pool error");
                ApiErrorResponse::new("Database unavailable.").with_details(err.to_string())
            }
            AppError::Validation(msg) => ApiErrorResponse::new(msg),
        };

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
