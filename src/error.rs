//! Error types for artisan-graph
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.
//! Mutating operations report their outcome to the UI layer as an
//! [`ActionResult`], so a failure is always a value and never a crash.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::data::StoreError;

/// Application-wide error type
///
/// This enum represents all possible errors that can occur
/// in the application. It implements `IntoResponse` to
/// automatically convert errors to appropriate HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// Authentication required (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Access denied (403)
    #[error("Access denied")]
    Forbidden,

    /// Validation error (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation not allowed for these arguments, e.g. following yourself (400)
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Conflicting state, e.g. a username already taken (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The document store rejected or failed a transaction
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Signature verification failed (401)
    #[error("Invalid signature")]
    InvalidSignature,

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Token signing error (500)
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    /// Short machine-readable label, used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound => "not_found",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::Validation(_) => "validation",
            AppError::InvalidOperation(_) => "invalid_operation",
            AppError::Conflict(_) => "conflict",
            AppError::Store(StoreError::MissingDocument(_)) => "not_found",
            AppError::Store(StoreError::Conflict(_)) => "conflict",
            AppError::Store(_) => "store",
            AppError::Database(_) => "database",
            AppError::InvalidSignature => "invalid_signature",
            AppError::Config(_) => "config",
            AppError::Encryption(_) => "encryption",
            AppError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound | AppError::Store(StoreError::MissingDocument(_)) => {
                StatusCode::NOT_FOUND
            }
            AppError::Unauthorized | AppError::InvalidSignature => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Validation(_) | AppError::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) | AppError::Store(StoreError::Conflict(_)) => {
                StatusCode::CONFLICT
            }
            AppError::Store(_)
            | AppError::Database(_)
            | AppError::Config(_)
            | AppError::Encryption(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the UI layer.
    ///
    /// Store failures keep their diagnostic text so the caller can render it
    /// inline; raw database and internal errors are masked.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Validation(msg)
            | AppError::InvalidOperation(msg)
            | AppError::Conflict(msg)
            | AppError::Config(msg)
            | AppError::Encryption(msg) => msg.clone(),
            AppError::Store(error) => error.to_string(),
            AppError::Database(_) => "Database error".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to appropriate HTTP status code
    /// and the uniform `{success: false, error}` body.
    fn into_response(self) -> Response {
        use axum::Json;

        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, kind = self.kind(), "Request failed");
        }

        // Record error metric
        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[self.kind()]).inc();

        let body = Json(ActionResult::failure(self.public_message()));

        (status, body).into_response()
    }
}

/// Uniform outcome of a mutating operation as seen by the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }

    /// Collapse a service result into the `{success, error}` shape.
    pub fn from_result<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::ok(),
            Err(error) => Self::failure(error.public_message()),
        }
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_result_carries_store_diagnostic() {
        let result: Result<()> = Err(AppError::Store(StoreError::MissingDocument(
            "users/u9".to_string(),
        )));
        let outcome = ActionResult::from_result(&result);
        assert!(!outcome.success);
        assert_eq!(
            outcome.error.as_deref(),
            Some("document users/u9 does not exist")
        );
    }

    #[test]
    fn action_result_masks_database_errors() {
        let result: Result<()> = Err(AppError::Database(sqlx::Error::PoolTimedOut));
        let outcome = ActionResult::from_result(&result);
        assert_eq!(outcome.error.as_deref(), Some("Database error"));
    }

    #[test]
    fn success_serializes_without_error_field() {
        let json = serde_json::to_value(ActionResult::ok()).unwrap();
        assert_eq!(json, serde_json::json!({ "success": true }));
    }

    #[test]
    fn missing_document_maps_to_not_found() {
        let error = AppError::Store(StoreError::MissingDocument("users/x".to_string()));
        assert_eq!(error.status(), StatusCode::NOT_FOUND);
        assert_eq!(error.kind(), "not_found");
    }
}
