use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {message}")]
    ValidationError { reason: String, message: String },

    #[error("Conflict: {message}")]
    Conflict { reason: String, message: String },

    #[error("External service error: {message}")]
    ExternalService { reason: String, message: String },
}

impl AppError {
    pub fn validation(reason: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::ValidationError {
            reason: reason.into(),
            message: message.into(),
        }
    }

    pub fn conflict(reason: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Conflict {
            reason: reason.into(),
            message: message.into(),
        }
    }

    pub fn external(reason: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::ExternalService {
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// Machine-readable reason code returned alongside the message.
    pub fn reason(&self) -> &str {
        match self {
            AppError::Auth(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Internal(_) => "internal_error",
            AppError::Database(_) => "database_error",
            AppError::ValidationError { reason, .. }
            | AppError::Conflict { reason, .. }
            | AppError::ExternalService { reason, .. } => reason,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ValidationError { .. } => StatusCode::BAD_REQUEST,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::ExternalService { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    fn message(&self) -> &str {
        match self {
            AppError::Auth(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::BadRequest(msg)
            | AppError::Internal(msg)
            | AppError::Database(msg) => msg,
            AppError::ValidationError { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::ExternalService { message, .. } => message,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!("Error: {}: {}", status, self.message());
        } else {
            tracing::warn!("Rejected: {} ({}): {}", status, self.reason(), self.message());
        }

        let body = Json(json!({
            "error": self.message(),
            "reason": self.reason(),
        }));

        (status, body).into_response()
    }
}
