//! Error types for substrate operations

use std::time::Duration;
use thiserror::Error;

/// Result type for substrate operations
pub type KvResult<T> = Result<T, KvError>;

/// Errors that can occur while talking to the key/value substrate
#[derive(Error, Debug)]
pub enum KvError {
    /// Connection to the substrate failed or was dropped
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The substrate rejected a command
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// Failed to establish or keep a keyspace subscription
    #[error("Subscribe failed: {0}")]
    SubscribeFailed(String),

    /// A stored value or notification payload could not be decoded
    #[error("Decode failed: {0}")]
    Decode(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl KvError {
    /// Whether the failure is caused by connectivity and worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            KvError::ConnectionFailed(_) | KvError::Timeout(_) | KvError::SubscribeFailed(_)
        )
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for KvError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            KvError::Timeout(Duration::ZERO)
        } else if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            KvError::ConnectionFailed(err.to_string())
        } else {
            KvError::CommandFailed(err.to_string())
        }
    }
}
