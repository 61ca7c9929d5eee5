//! Error types for the Fern PM emulators

use axum::http::StatusCode;
use thiserror::Error;

/// Result type alias using the emulator Error
pub type Result<T> = std::result::Result<T, Error>;

/// Emulator error taxonomy.
///
/// None of these are fatal to a running emulator: each one is rendered as an
/// HTTP status plus a JSON body in the emulated tool's own error shape, and
/// the server keeps accepting requests.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Resource not found: {kind} with id {id}")]
    NotFound { kind: String, id: String },

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Configured error ({status}): {message}")]
    Configured { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// HTTP status this error is surfaced with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Authentication(_) => StatusCode::UNAUTHORIZED,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::MalformedRequest(_) | Error::UnknownOperation(_) => StatusCode::BAD_REQUEST,
            Error::Configured { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Error::Serialization(_) => StatusCode::BAD_REQUEST,
            Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
