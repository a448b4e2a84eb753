// Error types module

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Centralized error type for the compression API
///
/// Categorizes failures into the client/engine/limit taxonomy so each
/// variant carries a stable wire-level `error` kind and an HTTP status.
/// Client errors carry a precise detail string; engine errors stay generic
/// on the wire while diagnostics are kept in operator logs.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// No usable `file` field in the multipart form
    MissingFile(String),

    /// Unrecognized compression profile name
    InvalidProfile(String),

    /// API keys are configured and the presented key did not match
    Unauthorized(String),

    /// Upload exceeds the configured maximum size
    PayloadTooLarge(String),

    /// Upload is not a PDF document
    UnsupportedMediaType(String),

    /// Per-client request quota exhausted
    RateLimited(String),

    /// Uploaded bytes could not be persisted to disk
    StorageError(String),

    /// Ghostscript ran but did not produce a usable document
    EngineFailure(String),

    /// Ghostscript binary is missing or not executable
    EngineUnavailable(String),
}

impl ApiError {
    /// Stable `error` kind emitted in the response envelope
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::MissingFile(_) => "missing_file",
            ApiError::InvalidProfile(_) => "invalid_profile",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::PayloadTooLarge(_) => "payload_too_large",
            ApiError::UnsupportedMediaType(_) => "unsupported_media_type",
            ApiError::RateLimited(_) => "rate_limited",
            ApiError::StorageError(_) => "storage_error",
            ApiError::EngineFailure(_) => "ghostscript_error",
            ApiError::EngineUnavailable(_) => "ghostscript_unavailable",
        }
    }

    /// Maps error kinds to HTTP status codes
    ///
    /// Status mapping:
    /// - MissingFile / InvalidProfile → 400 (Bad Request)
    /// - Unauthorized → 401
    /// - PayloadTooLarge → 413
    /// - UnsupportedMediaType → 415
    /// - RateLimited → 429
    /// - StorageError / EngineFailure → 500
    /// - EngineUnavailable → 503
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFile(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidProfile(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::StorageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::EngineFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::EngineUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn detail(&self) -> &str {
        match self {
            ApiError::MissingFile(msg)
            | ApiError::InvalidProfile(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::PayloadTooLarge(msg)
            | ApiError::UnsupportedMediaType(msg)
            | ApiError::RateLimited(msg)
            | ApiError::StorageError(msg)
            | ApiError::EngineFailure(msg)
            | ApiError::EngineUnavailable(msg) => msg,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.detail())
    }
}

impl std::error::Error for ApiError {}

/// The sole shape for all failure responses
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub ok: bool,
    pub error: &'static str,
    pub detail: String,
}

impl ErrorEnvelope {
    pub fn from_error(error: &ApiError) -> Self {
        Self {
            ok: false,
            error: error.kind(),
            detail: error.detail().to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let envelope = ErrorEnvelope::from_error(&self);
        (self.status(), Json(envelope)).into_response()
    }
}
