//! Error types for the image storage core
//!
//! All errors use thiserror for structured error handling.
//! Owner-facing errors serialize to a single message so an image failure
//! surfaces exactly like a failure of the owning mutation.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Persistence layer unreachable, lock timeout, or unexpected constraint failure
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Caller supplied an empty or otherwise unacceptable payload
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl AppError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
