//! Error types for Waypost
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Application-wide error type
///
/// The federation-specific variants map one-to-one onto the stages of the
/// inbound ingest pipeline, so a rejected request always carries the stage
/// that terminated it.
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// Activity body failed shape validation (400)
    #[error("Malformed activity: {0}")]
    MalformedActivity(String),

    /// Request carried no Signature header (401)
    #[error("Missing Signature header")]
    MissingSignature,

    /// Signature header could not be parsed (400)
    #[error("Invalid Signature header: {0}")]
    InvalidSignatureHeader(String),

    /// Parsed signature descriptor is missing required fields (400)
    #[error("Invalid signature model: {0}")]
    InvalidSignatureModel(String),

    /// Cryptographic verification of the request signature failed (401)
    #[error("Signature verification failed")]
    SignatureVerificationFailed,

    /// Signing key could not be resolved to a remote actor (401)
    #[error("Unknown key: {0}")]
    UnknownKey(String),

    /// Resolved actor, key owner and claimed actor disagree (401)
    #[error("Actor does not match signing key: {0}")]
    ActorKeyMismatch(String),

    /// Validation error outside the ingest pipeline (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP client error (502)
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Remote peer misbehaved while being fetched (502)
    #[error("Federation error: {0}")]
    Federation(String),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to appropriate HTTP status code
    /// and JSON error body.
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_message, error_type) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string(), "not_found"),
            AppError::MalformedActivity(msg) => {
                (StatusCode::BAD_REQUEST, msg.clone(), "malformed_activity")
            }
            AppError::MissingSignature => (
                StatusCode::UNAUTHORIZED,
                self.to_string(),
                "missing_signature",
            ),
            AppError::InvalidSignatureHeader(msg) => (
                StatusCode::BAD_REQUEST,
                msg.clone(),
                "invalid_signature_header",
            ),
            AppError::InvalidSignatureModel(msg) => (
                StatusCode::BAD_REQUEST,
                msg.clone(),
                "invalid_signature_model",
            ),
            AppError::SignatureVerificationFailed => (
                StatusCode::UNAUTHORIZED,
                self.to_string(),
                "signature_verification_failed",
            ),
            AppError::UnknownKey(_) => (StatusCode::UNAUTHORIZED, self.to_string(), "unknown_key"),
            AppError::ActorKeyMismatch(_) => (
                StatusCode::UNAUTHORIZED,
                self.to_string(),
                "actor_key_mismatch",
            ),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), "validation"),
            AppError::Federation(msg) => (StatusCode::BAD_GATEWAY, msg.clone(), "federation"),
            AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, self.to_string(), "http_client"),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
                "database",
            ),
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), "config"),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                "internal",
            ),
        };

        // Record error metric
        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[error_type]).inc();

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
