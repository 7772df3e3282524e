//! Error types for the core library.

use thiserror::Error;

/// Errors that can occur in core operations.
///
/// Absent records and sources are not errors: lookups return `None`
/// and removals or flag writes return `false`.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed search expression, or a fatal error while evaluating one.
    #[error("Search expression error: {0}")]
    Syntax(foldex_sexp::Error),

    /// Persisted data was written by a newer format version.
    #[error("Incompatible summary format: version {found}, supported up to {supported}")]
    IncompatibleFormat {
        /// Version found in the persisted header.
        found: u32,
        /// Highest version this build understands.
        supported: u32,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// The operation was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<foldex_sexp::Error> for Error {
    fn from(err: foldex_sexp::Error) -> Self {
        match err {
            foldex_sexp::Error::Cancelled => Self::Cancelled,
            other => Self::Syntax(other),
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
