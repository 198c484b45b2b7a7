//! Error types for the import pipeline

use thiserror::Error;

/// Errors surfaced by upload validation and ingestion.
///
/// Row-level transform faults never appear here: the normalizer swallows them
/// and drops the row. Anything below aborts or rejects the whole upload.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Only CSV files are allowed")]
    InvalidFileType,

    #[error("File exceeds the {limit} byte upload limit")]
    PayloadTooLarge { limit: usize },

    #[error("Malformed CSV document: {0}")]
    Parse(#[from] csv::Error),

    #[error("Failed to persist import state: {0}")]
    Persistence(String),
}

impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for ImportError {
    fn from(err: serde_json::Error) -> Self {
        ImportError::Persistence(err.to_string())
    }
}
