//! Error types for karabox
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::playback::ControlError;

/// Main error type for karabox
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// User already has this video queued
    #[error("You have already queued this video")]
    DuplicateEntry,

    /// Queue size limit reached
    #[error("Queue is full (max: {0})")]
    QueueFull(usize),

    /// Coordinator control rejected for the current state
    #[error("{0}")]
    Control(#[from] ControlError),

    /// Cast device protocol or connection errors (transient)
    #[error("Cast device error: {0}")]
    Device(String),

    /// Video acquisition errors
    #[error("Download failed: {0}")]
    Download(String),

    /// Missing authentication
    #[error("Not authenticated")]
    Unauthorized,

    /// Authenticated but not allowed
    #[error("{0}")]
    PermissionDenied(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status code this error maps to at the API boundary
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::DuplicateEntry => StatusCode::CONFLICT,
            Error::QueueFull(_) => StatusCode::BAD_REQUEST,
            Error::Control(_) => StatusCode::CONFLICT,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Download(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {}", self);
        }
        let body = Json(json!({
            "success": false,
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

/// Convenience Result type using karabox Error
pub type Result<T> = std::result::Result<T, Error>;
