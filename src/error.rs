//! Error types for the store and the HTTP surface.
//!
//! Store operations return [`StoreError`]; the HTTP layer converts those to
//! [`ApiError`], which serializes as a JSON body with a stable `error` code.
//! Cross-tenant access always maps to `not_found` so callers cannot probe for
//! the existence of other tenants' jobs.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Errors from the persistence layer and lifecycle guards.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("job is not cancellable in its current state")]
    NotCancellable,

    #[error("job is not deletable in its current state")]
    NotDeletable,

    /// Force cancel requested before the grace period elapsed.
    #[error("force cancel rejected, retry in {wait_seconds}s")]
    GracePeriod { wait_seconds: i64 },

    /// Malformed caller input (unknown state name, non-terminal state set, ...).
    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

/// Errors surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing or invalid credentials")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("{0}")]
    BadRequest(String),

    #[error("not found")]
    NotFound,

    #[error("job is not cancellable in its current state")]
    NotCancellable,

    #[error("job is not deletable in its current state")]
    NotDeletable,

    #[error("force cancel rejected, retry in {wait_seconds}s")]
    GracePeriod { wait_seconds: i64 },
}

impl ApiError {
    /// Stable machine-readable error code for the JSON body.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "unauthorized",
            ApiError::Forbidden => "forbidden",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::NotFound => "not_found",
            ApiError::NotCancellable => "not_cancellable",
            ApiError::NotDeletable => "not_deletable",
            ApiError::GracePeriod { .. } => "grace_period",
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::NotCancellable => StatusCode::BAD_REQUEST,
            ApiError::NotDeletable => StatusCode::BAD_REQUEST,
            // 425 Too Early; the http crate has no named constant for it.
            ApiError::GracePeriod { .. } => {
                StatusCode::from_u16(425).unwrap_or(StatusCode::BAD_REQUEST)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        if let ApiError::GracePeriod { wait_seconds } = &self {
            body["waitSeconds"] = json!(wait_seconds);
        }
        (self.status(), Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ApiError::NotFound,
            StoreError::NotCancellable => ApiError::NotCancellable,
            StoreError::NotDeletable => ApiError::NotDeletable,
            StoreError::GracePeriod { wait_seconds } => ApiError::GracePeriod { wait_seconds },
            StoreError::Invalid(message) => ApiError::BadRequest(message),
            // Persistence failures surface as their message, never as a panic.
            StoreError::Db(db) => ApiError::BadRequest(db.to_string()),
        }
    }
}
