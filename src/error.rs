//! Centralized error handling.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-wide error type.
///
/// Handlers, repositories, social clients and background tasks all report
/// through this type so HTTP responses and task failures stay consistent.
#[derive(Error, Debug)]
pub enum AppError {
    /// Bad request error (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Unauthorized error (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Not found error (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Platform the operation does not support (400)
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// Dependency temporarily unavailable (503)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Non-success response from a social platform API
    #[error("Upstream error ({status}): {body}")]
    Upstream { status: u16, body: String },

    /// Language model failure
    #[error("LLM error: {0}")]
    Llm(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Redis error
    #[error("Cache error: {0}")]
    Redis(#[from] deadpool_redis::redis::RedisError),

    /// Redis pool error
    #[error("Cache pool error: {0}")]
    RedisPool(#[from] deadpool_redis::PoolError),

    /// JWT error
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// Template rendering error
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MessagePack encoding error (task records)
    #[error("Encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding error (task records)
    #[error("Decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl AppError {
    /// Whether a background task failing with this error should be retried.
    ///
    /// Transport failures, 5xx and 429 from upstream are transient; everything
    /// else fails the task immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream { status, .. } => *status >= 500 || *status == 429,
            Self::HttpClient(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::RedisPool(_) | Self::ServiceUnavailable(_) => true,
            _ => false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            Self::BadRequest(msg) | Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::UnsupportedPlatform(platform) => (
                StatusCode::BAD_REQUEST,
                format!("Platform '{platform}' is not supported"),
            ),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            Self::Upstream { status, body } => {
                tracing::warn!(upstream_status = status, body = %body, "Upstream API error");
                (
                    StatusCode::BAD_GATEWAY,
                    format!("Upstream API returned {status}"),
                )
            }
            Self::Llm(msg) => {
                tracing::error!("LLM error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "Content generation service error".to_string(),
                )
            }
            Self::Database(e) => {
                tracing::error!("Database error: {e:?}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Database error occurred".to_string(),
                )
            }
            Self::Redis(e) => {
                tracing::error!("Redis error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Cache error occurred".to_string(),
                )
            }
            Self::RedisPool(e) => {
                tracing::error!("Redis pool error: {e:?}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Cache connection error occurred".to_string(),
                )
            }
            Self::Jwt(e) => {
                tracing::warn!("JWT error: {e:?}");
                (StatusCode::UNAUTHORIZED, format!("Invalid token: {e}"))
            }
            Self::Template(e) => {
                tracing::error!("Template error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Template rendering error".to_string(),
                )
            }
            Self::Json(e) => {
                tracing::error!("JSON error: {e:?}");
                (StatusCode::BAD_REQUEST, format!("JSON error: {e}"))
            }
            Self::Encode(e) => {
                tracing::error!("Encode error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Task serialization error".to_string(),
                )
            }
            Self::Decode(e) => {
                tracing::error!("Decode error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Task deserialization error".to_string(),
                )
            }
            Self::HttpClient(e) => {
                tracing::warn!("HTTP client error: {e:?}");
                (
                    StatusCode::BAD_GATEWAY,
                    "External service error".to_string(),
                )
            }
        };

        // Report error to Sentry for server errors
        if status.is_server_error() {
            sentry::capture_error(&self);
        }

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using `AppError`.
pub type AppResult<T> = Result<T, AppError>;

/// Helper trait for converting validation errors.
pub trait ValidationErrorExt {
    fn to_validation_error(&self) -> AppError;
}

impl ValidationErrorExt for validator::ValidationErrors {
    fn to_validation_error(&self) -> AppError {
        // Schema-level errors carry the cross-field message
        if let Some(error) = self
            .errors()
            .get("__all__")
            .and_then(|kind| match kind {
                validator::ValidationErrorsKind::Field(errors) => errors.first(),
                _ => None,
            })
        {
            if let Some(message) = &error.message {
                return AppError::Validation(message.to_string());
            }
        }

        if let Some((field, errors)) = self.field_errors().iter().next() {
            if let Some(error) = errors.first() {
                let message = error.message.as_ref().map_or_else(
                    || {
                        format!(
                            "Validation failed on field '{field}' with tag '{}'",
                            error.code
                        )
                    },
                    std::string::ToString::to_string,
                );
                return AppError::Validation(message);
            }
        }
        AppError::Validation(self.to_string())
    }
}
