use thiserror::Error;

use crate::ingest::ValidationReport;

/// Main error type for Roster
#[derive(Error, Debug)]
pub enum RosterError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upload rejected before parsing (missing file, unrecognized content type)
    #[error("Unsupported upload: {0}")]
    UnsupportedUpload(String),

    /// Malformed delimited text
    #[error("Parse error at line {line}: {message}")]
    Parse { line: u64, message: String },

    /// One or more rows failed schema or hierarchy validation
    #[error("Validation failed: {0}")]
    Validation(ValidationReport),

    /// A concurrent import committed first and invalidated this batch's snapshot
    #[error("Concurrent import conflict: {0}")]
    Conflict(String),

    /// Employee not found
    #[error("Employee not found: {0}")]
    NotFound(i64),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Runtime failures that are not the caller's fault
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RosterError {
    /// Stable taxonomy name used by the transport layer.
    pub fn kind(&self) -> &'static str {
        match self {
            RosterError::UnsupportedUpload(_)
            | RosterError::Validation(_)
            | RosterError::InvalidInput(_) => "validation",
            RosterError::Parse { .. } => "parse",
            RosterError::Database(_) | RosterError::Io(_) => "storage",
            RosterError::Conflict(_) => "conflict",
            RosterError::NotFound(_) => "not_found",
            RosterError::Config(_) | RosterError::Internal(_) => "internal",
        }
    }
}

impl From<csv::Error> for RosterError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map_or(0, |pos| pos.line());
        match err.into_kind() {
            csv::ErrorKind::Io(io_err) => RosterError::Io(io_err),
            csv::ErrorKind::UnequalLengths { expected_len, len, .. } => RosterError::Parse {
                line,
                message: format!("expected {} fields, found {}", expected_len, len),
            },
            csv::ErrorKind::Utf8 { err, .. } => RosterError::Parse {
                line,
                message: format!("invalid UTF-8 in field {}", err.field() + 1),
            },
            csv::ErrorKind::Deserialize { err, .. } => RosterError::Parse {
                line,
                message: err.to_string(),
            },
            other => RosterError::Parse {
                line,
                message: format!("{:?}", other),
            },
        }
    }
}

/// Convenient Result type using RosterError
pub type Result<T> = std::result::Result<T, RosterError>;
