//! Error types for listing and scanning.

use filesprawl_db::DbError;
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Failures reported by a listing source for one call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListingError {
    /// Transport failure or an overloaded server; worth retrying.
    #[error("Remote unavailable listing '{path}': {message}")]
    Unavailable { path: String, message: String },

    /// The rc server reported its own error for this path.
    #[error("Remote rejected '{path}' (status {status}): {message}")]
    Rejected {
        path: String,
        status: u16,
        message: String,
    },

    /// A success response that does not decode into descriptors.
    #[error("Malformed listing for '{path}': {message}")]
    Decode { path: String, message: String },
}

impl ListingError {
    pub fn unavailable(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn rejected(path: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            path: path.into(),
            status,
            message: message.into(),
        }
    }

    pub fn decode(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Only transport-level failures are retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    pub fn path(&self) -> &str {
        match self {
            Self::Unavailable { path, .. }
            | Self::Rejected { path, .. }
            | Self::Decode { path, .. } => path,
        }
    }
}

/// Scan engine error type
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Listing failed: {0}")]
    Listing(#[from] ListingError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] DbError),

    #[error("Scan already in progress for remote '{0}'")]
    ScanInProgress(String),

    #[error("Scan cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ScanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::Config(_) => ErrorKind::Validation,
            Self::Listing(err) => ErrorKind::from(err),
            Self::Persistence(err) => ErrorKind::from(err),
            Self::ScanInProgress(_) => ErrorKind::ScanInProgress,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io(_) => ErrorKind::Persistence,
        }
    }
}

/// Coarse classification shared by run failures and per-item errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    RemoteUnavailable,
    RemoteRejected,
    Persistence,
    NotFound,
    ScanInProgress,
    Cancelled,
}

impl From<&ListingError> for ErrorKind {
    fn from(err: &ListingError) -> Self {
        match err {
            ListingError::Unavailable { .. } => Self::RemoteUnavailable,
            ListingError::Rejected { .. } | ListingError::Decode { .. } => Self::RemoteRejected,
        }
    }
}

impl From<&DbError> for ErrorKind {
    fn from(err: &DbError) -> Self {
        match err {
            DbError::Validation(_) => Self::Validation,
            DbError::NotFound(_) => Self::NotFound,
            _ => Self::Persistence,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::RemoteUnavailable => "remote_unavailable",
            Self::RemoteRejected => "remote_rejected",
            Self::Persistence => "persistence",
            Self::NotFound => "not_found",
            Self::ScanInProgress => "scan_in_progress",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{name}")
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ScanError>;
