//! Error types for the synchronization engine.

use thiserror::Error;

/// Errors that can occur during package synchronization.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Connection, DNS, or timeout failure while talking to the remote
    #[error("network error: {0}")]
    Network(String),

    /// Remote answered with a non-success HTTP status
    #[error("request failed with status {status}")]
    HttpStatus { status: u16 },

    /// Remote served an HTML page where a binary payload was expected,
    /// typically an expired or mis-shared link
    #[error("expected binary payload, got content type {content_type}")]
    ContentType { content_type: String },

    /// Downloaded archive has bad magic bytes or is otherwise corrupt
    #[error("invalid archive: {0}")]
    InvalidArchive(String),

    /// One or more per-file fetches inside a delta batch failed
    #[error("delta batch incomplete: {completed} of {attempted} files fetched")]
    PartialFetch { attempted: usize, completed: usize },

    /// Persisted installation mapping is unreadable or of unexpected shape
    #[error("installation state unreadable: {0}")]
    StateCorruption(String),

    /// Source does not support revision comparison, or the revision API failed
    #[error("revision history unavailable: {0}")]
    RevisionUnavailable(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Network(err.to_string())
    }
}

impl From<zip::result::ZipError> for SyncError {
    fn from(err: zip::result::ZipError) -> Self {
        SyncError::InvalidArchive(err.to_string())
    }
}
