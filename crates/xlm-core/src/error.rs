//! Error types for xlm-core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in xlm-core
#[derive(Debug, Error)]
pub enum Error {
    /// Input root directory does not exist or is not a directory
    #[error("input directory not found: '{0}'")]
    NotFound(PathBuf),

    /// A single input file could not be opened or decoded
    #[error("failed to read '{path}': {message}")]
    CorruptFile { path: PathBuf, message: String },

    /// A configured dedup key column is missing from the merged schema
    #[error("dedup key column '{column}' is not present in group '{group}'")]
    InvalidDedupKey { group: String, column: String },

    /// The output workbook could not be written
    #[error("failed to write '{path}': {message}")]
    Write { path: PathBuf, message: String },

    /// Configuration rejected before any work started
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The run was stopped through its cancel token
    #[error("merge cancelled")]
    Cancelled,

    /// A process worker broke its stdout protocol
    #[error("worker for '{path}' failed: {message}")]
    Worker { path: PathBuf, message: String },

    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CSV parsing error from the csv crate
    #[error("CSV error in '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_key_message() {
        let err = Error::InvalidDedupKey {
            group: "merged".to_string(),
            column: "id".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "dedup key column 'id' is not present in group 'merged'"
        );
    }
}
