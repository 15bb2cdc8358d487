//! Registry error types

use fleet_kv::KvError;
use fleet_vector::IndexError;
use thiserror::Error;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors surfaced by the registry, publisher and mirror
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Key/value substrate failure
    #[error("Substrate error: {0}")]
    Kv(#[from] KvError),

    /// Semantic index failure
    #[error("Semantic index error: {0}")]
    Index(#[from] IndexError),

    /// A descriptor could not be decoded or failed validation
    #[error("Invalid descriptor for {url}: {reason}")]
    InvalidDescriptor { url: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RegistryError {
    pub fn invalid_descriptor(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Connectivity failures worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            RegistryError::Kv(e) => e.is_transient(),
            RegistryError::Index(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Failure reported by a change handler
///
/// Logged by the fan-out worker; never stops delivery.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl std::fmt::Display) -> Self {
        Self(message.to_string())
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

impl From<RegistryError> for HandlerError {
    fn from(err: RegistryError) -> Self {
        Self(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_transient_classification() {
        assert!(RegistryError::Kv(KvError::Timeout(Duration::from_secs(1))).is_transient());
        assert!(!RegistryError::Kv(KvError::Decode("x".into())).is_transient());
        assert!(RegistryError::Index(IndexError::Connection("refused".into())).is_transient());
        assert!(!RegistryError::invalid_descriptor("http://a:1", "missing name").is_transient());
    }
}
