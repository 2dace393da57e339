use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::search::SearchError;
use crate::store::StoreError;
use crate::template::TemplateError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Service busy: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => AppError::NotFound(format!("Template {}", id)),
            StoreError::AlreadyExists(id) => AppError::AlreadyExists(format!("Template {}", id)),
            StoreError::Invalid(e) => AppError::Validation(e.to_string()),
            e if e.is_transient() => AppError::Unavailable(e.to_string()),
            e => AppError::Internal(e.to_string()),
        }
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::InvalidCursor(e) => AppError::InvalidCursor(e.to_string()),
            SearchError::Unavailable(msg) => AppError::Unavailable(msg),
        }
    }
}

impl From<TemplateError> for AppError {
    fn from(err: TemplateError) -> Self {
        AppError::Validation(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

fn redact(detail: &str, generic: &str) -> String {
    if is_production() {
        generic.to_string()
    } else {
        detail.to_string()
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Config(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) | AppError::InvalidCursor(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AlreadyExists(_) => StatusCode::CONFLICT,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::AlreadyExists(_) => "ALREADY_EXISTS",
            AppError::InvalidCursor(_) => "INVALID_CURSOR",
            AppError::Unavailable(_) => "SERVICE_BUSY",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let (client_message, log_message) = match &self {
            AppError::Config(e) => {
                let log_msg = e.to_string();
                (redact(&log_msg, "Configuration error"), log_msg)
            }
            AppError::Internal(msg) => (redact(msg, "Internal server error"), msg.clone()),
            AppError::Unavailable(msg) => (
                redact(msg, "Service temporarily unavailable, try again later"),
                msg.clone(),
            ),
            AppError::Validation(msg)
            | AppError::NotFound(msg)
            | AppError::AlreadyExists(msg)
            | AppError::InvalidCursor(msg) => (msg.clone(), msg.clone()),
        };

        if status.is_server_error() {
            tracing::error!(code = %code, status = %status.as_u16(), message = %log_message, "API error");
        } else {
            tracing::debug!(code = %code, status = %status.as_u16(), message = %log_message, "API error");
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: client_message,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::CursorError;

    #[test]
    fn test_store_error_mapping() {
        let err = AppError::from(StoreError::NotFound("t1".to_string()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = AppError::from(StoreError::Unavailable("down".to_string()));
        assert_eq!(err.code(), "SERVICE_BUSY");
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_search_error_mapping() {
        let err = AppError::from(SearchError::InvalidCursor(CursorError::ModeMismatch));
        assert_eq!(err.code(), "INVALID_CURSOR");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_into_response_status() {
        let response = AppError::AlreadyExists("Template t1".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
