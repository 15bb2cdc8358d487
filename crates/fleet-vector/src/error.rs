//! Error types for semantic index operations

use thiserror::Error;

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors raised by a [`SemanticIndex`](crate::SemanticIndex)
#[derive(Debug, Error)]
pub enum IndexError {
    /// The index service could not be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// The request did not finish in time
    #[error("Request timed out")]
    Timeout,

    /// The service answered with a non-success status
    #[error("Index service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The service answer could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// The collection does not exist
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// Invalid client configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl IndexError {
    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            IndexError::Connection(_) | IndexError::Timeout => true,
            IndexError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for IndexError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            IndexError::Timeout
        } else if err.is_decode() {
            IndexError::Decode(err.to_string())
        } else {
            IndexError::Connection(err.to_string())
        }
    }
}
