use crate::library::book::BookError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum AppError {
    /// Referenced user, book, request, friendship or rejection is absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Contradictory or malformed book input.
    #[error("Validation error: {0}")]
    Validation(#[from] BookError),

    /// Malformed account input (username, password, role).
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// The target of an operation cannot take part in it.
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Duplicate request, already friends or another uniqueness clash.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Missing or expired credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The acting user may not touch this resource.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) | AppError::InvalidFormat(_) | AppError::InvalidTarget(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AppError::Io(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error = %self, "Request error");
        } else {
            tracing::debug!(error = %self, status = %status, "Request rejected");
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// Result type alias for the application.
pub type Result<T> = std::result::Result<T, AppError>;

/// Map a storage error on `entity`, turning unique-index violations into `Conflict`.
pub(crate) fn storage_error(entity: &'static str) -> impl FnOnce(rusqlite::Error) -> AppError {
    move |e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("{} already exists", entity))
        } else {
            AppError::Internal(format!("Database error ({}): {}", entity, e))
        }
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}
