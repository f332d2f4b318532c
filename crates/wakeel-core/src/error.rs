//! Error types for wakeel-core

use thiserror::Error;

/// Result type alias using wakeel-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in wakeel-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// No remote endpoint or credentials configured; sync is a no-op
    #[error("Sync is not configured")]
    Unconfigured,

    /// Remote reachable but missing an expected table or column
    #[error("Remote schema is missing {table}.{column}")]
    Schema {
        /// Table the probe failed on
        table: String,
        /// Column the probe failed on
        column: String,
    },

    /// Transient connectivity or timeout failure
    #[error("Network error: {0}")]
    Network(String),

    /// Structurally malformed local record
    #[error("Cannot map {table}: bad field '{field}'")]
    Mapping {
        /// Remote table the record was headed for
        table: String,
        /// Field that failed structural validation
        field: String,
    },

    /// A table's upload exhausted its retries this pass
    #[error("Upload abandoned for table {table}: {message}")]
    TableUpload {
        /// Table whose pass was abandoned
        table: String,
        /// Underlying failure description
        message: String,
    },

    /// Remote API rejected a request
    #[error("Remote API error: {0}")]
    Api(String),

    /// The pass was cancelled or ran past its deadline
    #[error("Sync pass abandoned")]
    Cancelled,

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Object storage error
    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Whether this error is worth retrying at the chunk level.
    /// Rejected requests are not: resending the same payload cannot help.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Storage(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}
