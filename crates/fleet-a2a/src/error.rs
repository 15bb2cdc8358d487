//! A2A Protocol Error Types

use thiserror::Error;

/// Result type for A2A operations
pub type A2aResult<T> = Result<T, A2aError>;

/// Errors that can occur in A2A protocol operations
#[derive(Debug, Error)]
pub enum A2aError {
    /// The remote agent endpoint was not found
    #[error("Agent not found: {agent_url}")]
    AgentNotFound { agent_url: String },

    /// Agent card validation failed
    #[error("Invalid agent card: {reason}")]
    InvalidAgentCard { reason: String },

    /// Message validation failed
    #[error("Invalid message: {reason}")]
    InvalidMessage { reason: String },

    /// Authentication required
    #[error("Authentication required")]
    AuthenticationRequired,

    /// Authorization failed
    #[error("Not authorized: {reason}")]
    NotAuthorized { reason: String },

    /// Rate limit exceeded
    #[error("Rate limit exceeded: retry after {retry_after_seconds} seconds")]
    RateLimitExceeded { retry_after_seconds: u64 },

    /// Connection error
    #[error("Connection error: {message}")]
    ConnectionError { message: String },

    /// Request timeout
    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Protocol error: malformed frames, unexpected payloads
    #[error("Protocol error: {message}")]
    ProtocolError { message: String },

    /// The remote agent answered with a JSON-RPC error object
    #[error("Remote error {code}: {message}")]
    Remote { code: i32, message: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),

    /// HTTP error (when client feature is enabled)
    #[cfg(feature = "client")]
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl A2aError {
    /// Create an invalid agent card error
    pub fn invalid_agent_card(reason: impl Into<String>) -> Self {
        Self::InvalidAgentCard {
            reason: reason.into(),
        }
    }

    /// Create an invalid message error
    pub fn invalid_message(reason: impl Into<String>) -> Self {
        Self::InvalidMessage {
            reason: reason.into(),
        }
    }

    /// Create a connection error
    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::ConnectionError {
            message: message.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol_error(message: impl Into<String>) -> Self {
        Self::ProtocolError {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            A2aError::ConnectionError { .. }
                | A2aError::Timeout { .. }
                | A2aError::RateLimitExceeded { .. }
        )
    }

    /// JSON-RPC error code used when this error is reported to a caller
    pub fn rpc_code(&self) -> i32 {
        match self {
            A2aError::SerializationError(_) => JsonRpcError::PARSE_ERROR,
            A2aError::InvalidMessage { .. } => JsonRpcError::INVALID_PARAMS,
            A2aError::Remote { code, .. } => *code,
            _ => JsonRpcError::INTERNAL_ERROR,
        }
    }
}

/// JSON-RPC 2.0 error object
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Additional error data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    /// Create a new error object
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Add data to the error object
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(Self::METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }
}

impl From<&A2aError> for JsonRpcError {
    fn from(err: &A2aError) -> Self {
        JsonRpcError::new(err.rpc_code(), err.to_string())
    }
}

impl From<JsonRpcError> for A2aError {
    fn from(err: JsonRpcError) -> Self {
        A2aError::Remote {
            code: err.code,
            message: err.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(A2aError::connection_error("reset").is_retryable());
        assert!(A2aError::Timeout { timeout_ms: 10 }.is_retryable());
        assert!(!A2aError::protocol_error("bad frame").is_retryable());
        assert!(
            !A2aError::Remote {
                code: -32603,
                message: "boom".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_rpc_error_conversion() {
        let err = A2aError::invalid_message("no text part");
        let rpc = JsonRpcError::from(&err);
        assert_eq!(rpc.code, JsonRpcError::INVALID_PARAMS);
        assert!(rpc.message.contains("no text part"));

        let back = A2aError::from(JsonRpcError::new(-32001, "task not found"));
        assert!(matches!(back, A2aError::Remote { code: -32001, .. }));
    }

    #[test]
    fn test_rpc_error_serialization_omits_empty_data() {
        let json = serde_json::to_value(JsonRpcError::method_not_found("tasks/get")).unwrap();
        assert_eq!(json["code"], -32601);
        assert!(json.get("data").is_none());
    }
}
