//! Error types for planning and model calls

use thiserror::Error;

pub type LlmResult<T> = Result<T, LlmError>;

/// Failures talking to the chat model
#[derive(Debug, Error)]
pub enum LlmError {
    /// The endpoint could not be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// The call did not finish in time
    #[error("Request timed out")]
    Timeout,

    /// The provider throttled the call
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The provider answered with an error status
    #[error("Model API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The answer did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Provider name or endpoint settings are unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Connection(_) | LlmError::Timeout | LlmError::RateLimited(_) => true,
            LlmError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else if err.is_decode() {
            LlmError::InvalidResponse(err.to_string())
        } else {
            LlmError::Connection(err.to_string())
        }
    }
}

/// The planner could not produce a plan
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("Planner model failed: {0}")]
    Llm(#[from] LlmError),
}

impl PlannerError {
    pub fn is_retryable(&self) -> bool {
        match self {
            PlannerError::Llm(e) => e.is_retryable(),
        }
    }
}

/// The routing agent could not be assembled
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("Chat model setup failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Dispatcher setup failed: {0}")]
    A2a(#[from] fleet_a2a::A2aError),
}
