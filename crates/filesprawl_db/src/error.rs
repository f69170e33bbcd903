//! Error types for the catalog store.

use thiserror::Error;

/// Catalog operation result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Catalog store errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error (connection, query, etc.)
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// IO error (file system operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A strict create hit an existing row
    #[error("Already exists: {0}")]
    Conflict(String),

    /// Input rejected before any statement was issued
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error (structured metadata)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DbError {
    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a conflict error.
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// True for failures of the storage itself, as opposed to bad input or
    /// missing rows.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Sqlx(_) | Self::Io(_) | Self::Serialization(_))
    }
}
