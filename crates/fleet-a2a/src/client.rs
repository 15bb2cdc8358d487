//! A2A Protocol Client
//!
//! HTTP client for talking JSON-RPC to A2A agents.
//!
//! # Connection Behavior
//!
//! | Operation | Default Timeout | Notes |
//! |-----------|-----------------|-------|
//! | Agent card, `message/send` | 30 seconds | |
//! | `message/stream` | 5 minutes | Whole response, body included |
//!
//! The client is `Clone` and shares `reqwest`'s connection pool. It does not
//! retry; callers decide with [`A2aError::is_retryable`].
//!
//! # Streaming
//!
//! ```rust,ignore
//! use futures::StreamExt;
//!
//! let client = A2aClient::new("http://coder:9000/")?;
//! let request = SendStreamingMessageRequest::stream(MessageSendParams::new(
//!     Message::user_text("Sort a list in Python"),
//! ));
//! let mut stream = client.send_message_streaming(&request).await?;
//! while let Some(frame) = stream.next().await {
//!     if let Some(text) = frame?.result.as_ref().and_then(|r| r.artifact_text()) {
//!         println!("{text}");
//!     }
//! }
//! ```

use futures::{Stream, StreamExt};
use reqwest::{Client, StatusCode};
use std::pin::Pin;
use std::time::Duration;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};
use url::Url;

use crate::error::{A2aError, A2aResult};
use crate::types::{
    AgentCard, JsonRpcRequest, JsonRpcResponse, METHOD_MESSAGE_SEND, MessageSendParams,
    SendStreamingMessageRequest, StreamResponse, StreamResult,
};

/// Default timeout for regular requests
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for streaming requests
const STREAMING_TIMEOUT: Duration = Duration::from_secs(300);

/// Frames of a streamed reply
///
/// Frames that cannot be decoded are yielded as [`A2aError::ProtocolError`]
/// and the stream continues. A JSON-RPC error frame is yielded as
/// [`A2aError::Remote`]; a transport failure as [`A2aError::ConnectionError`],
/// after which the stream ends.
pub type ResponseStream = Pin<Box<dyn Stream<Item = A2aResult<StreamResponse>> + Send>>;

/// A2A client bound to one agent endpoint
#[derive(Clone)]
pub struct A2aClient {
    /// JSON-RPC endpoint, the `url` of the agent card
    endpoint: Url,
    /// HTTP client
    http: Client,
    /// Timeout for a whole streamed reply
    stream_timeout: Duration,
}

impl std::fmt::Debug for A2aClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("A2aClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("stream_timeout", &self.stream_timeout)
            .finish()
    }
}

impl A2aClient {
    /// Create a new A2A client for the given agent endpoint
    pub fn new(endpoint: impl AsRef<str>) -> A2aResult<Self> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(format!("fleet-a2a/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                A2aError::connection_error(format!("Failed to create HTTP client: {}", e))
            })?;
        Self::with_http_client(endpoint, http)
    }

    /// Create a new A2A client with a custom HTTP client
    pub fn with_http_client(endpoint: impl AsRef<str>, http: Client) -> A2aResult<Self> {
        Ok(Self {
            endpoint: Url::parse(endpoint.as_ref())?,
            http,
            stream_timeout: STREAMING_TIMEOUT,
        })
    }

    /// Bound the total duration of a streamed reply
    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }

    /// The JSON-RPC endpoint
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Fetch the agent card from the well-known path of the endpoint's host
    pub async fn get_agent_card(&self) -> A2aResult<AgentCard> {
        let url = self
            .endpoint
            .join("/.well-known/agent.json")
            .map_err(|e| A2aError::protocol_error(format!("Invalid card path: {}", e)))?;

        debug!(url = %url, "Fetching agent card");

        let response = self.http.get(url).send().await.map_err(|e| {
            A2aError::connection_error(format!("Failed to fetch agent card: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.handle_error_response(status, response).await);
        }

        let card: AgentCard = response.json().await.map_err(|e| {
            A2aError::protocol_error(format!("Failed to parse agent card: {}", e))
        })?;
        Ok(card)
    }

    /// Send a blocking `message/send` and return the single result
    pub async fn send_message(&self, params: MessageSendParams) -> A2aResult<StreamResult> {
        let request = JsonRpcRequest::new(METHOD_MESSAGE_SEND, params);
        debug!(url = %self.endpoint, "Sending message");

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| A2aError::connection_error(format!("Failed to send message: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.handle_error_response(status, response).await);
        }

        let reply: JsonRpcResponse<StreamResult> = response.json().await.map_err(|e| {
            A2aError::protocol_error(format!("Failed to parse response: {}", e))
        })?;
        match (reply.result, reply.error) {
            (_, Some(error)) => Err(error.into()),
            (Some(result), None) => Ok(result),
            (None, None) => Err(A2aError::protocol_error("response has neither result nor error")),
        }
    }

    /// Send a `message/stream` request and stream the reply frames
    ///
    /// Dropping the returned stream closes the connection.
    pub async fn send_message_streaming(
        &self,
        request: &SendStreamingMessageRequest,
    ) -> A2aResult<ResponseStream> {
        debug!(url = %self.endpoint, "Sending message with streaming");

        let response = self
            .http
            .post(self.endpoint.clone())
            .timeout(self.stream_timeout)
            .header("Accept", "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    A2aError::Timeout {
                        timeout_ms: self.stream_timeout.as_millis() as u64,
                    }
                } else {
                    A2aError::connection_error(format!("Failed to send streaming request: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.handle_error_response(status, response).await);
        }

        // Some agents answer request-level failures with a plain JSON body
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));
        if is_json {
            let frame: StreamResponse = response.json().await.map_err(|e| {
                A2aError::protocol_error(format!("Failed to parse response: {}", e))
            })?;
            return Ok(Box::pin(futures::stream::iter([frame_into_result(frame)])));
        }

        let (tx, rx) = tokio::sync::mpsc::channel::<A2aResult<StreamResponse>>(32);

        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(chunk_result) = stream.next().await {
                match chunk_result {
                    Ok(chunk) => {
                        buffer.extend_from_slice(&chunk);

                        while let Some(frame) = parse_sse_event(&mut buffer) {
                            if tx.send(frame).await.is_err() {
                                // Receiver dropped
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx
                            .send(Err(A2aError::connection_error(format!(
                                "Stream error: {}",
                                e
                            ))))
                            .await;
                        return;
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    /// Map a non-success HTTP status to an error
    async fn handle_error_response(
        &self,
        status: StatusCode,
        response: reqwest::Response,
    ) -> A2aError {
        let error_text = response.text().await.unwrap_or_default();

        match status {
            StatusCode::NOT_FOUND => A2aError::AgentNotFound {
                agent_url: self.endpoint.to_string(),
            },
            StatusCode::UNAUTHORIZED => A2aError::AuthenticationRequired,
            StatusCode::FORBIDDEN => A2aError::NotAuthorized { reason: error_text },
            StatusCode::TOO_MANY_REQUESTS => A2aError::RateLimitExceeded {
                retry_after_seconds: 60,
            },
            StatusCode::BAD_REQUEST => A2aError::InvalidMessage { reason: error_text },
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE => {
                A2aError::connection_error(format!("HTTP {}: {}", status, error_text))
            }
            StatusCode::INTERNAL_SERVER_ERROR => A2aError::InternalError {
                message: error_text,
            },
            _ => A2aError::protocol_error(format!("HTTP {}: {}", status, error_text)),
        }
    }
}

fn frame_into_result(frame: StreamResponse) -> A2aResult<StreamResponse> {
    match frame.error {
        Some(error) => Err(error.into()),
        None => Ok(frame),
    }
}

/// Position and length of the blank line that ends the first event
fn event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    buffer.iter().enumerate().find_map(|(i, &b)| {
        if b != b'\n' {
            return None;
        }
        let rest = &buffer[i + 1..];
        if rest.starts_with(b"\n") {
            Some((i, 2))
        } else if rest.starts_with(b"\r\n") {
            Some((i, 3))
        } else {
            None
        }
    })
}

/// Take the next complete event carrying data off the front of `buffer`
///
/// Comment-only events (keep-alive pings) are consumed and skipped.
fn parse_sse_event(buffer: &mut Vec<u8>) -> Option<A2aResult<StreamResponse>> {
    loop {
        let (end, sep) = event_boundary(buffer)?;
        let raw: Vec<u8> = buffer.drain(..end + sep).take(end).collect();
        let event_str = String::from_utf8_lossy(&raw);

        let mut event_type = None;
        let mut data = String::new();

        for line in event_str.lines() {
            if let Some(value) = line.strip_prefix("event:") {
                event_type = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix("data:") {
                if !data.is_empty() {
                    data.push('\n');
                }
                data.push_str(value.strip_prefix(' ').unwrap_or(value));
            }
        }

        if data.is_empty() {
            continue;
        }

        return Some(match serde_json::from_str::<StreamResponse>(&data) {
            Ok(frame) => frame_into_result(frame),
            Err(e) => {
                warn!(
                    event_type = ?event_type,
                    error = %e,
                    "Failed to parse SSE event"
                );
                Err(A2aError::protocol_error(format!(
                    "Failed to parse streaming event: {}",
                    e
                )))
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTIFACT_FRAME: &str = r#"{"jsonrpc":"2.0","id":"1","result":{"kind":"artifact-update","taskId":"t","contextId":"c","artifact":{"artifactId":"a","parts":[{"kind":"text","text":"hello"}]}}}"#;

    #[test]
    fn test_client_creation() {
        let client = A2aClient::new("https://agent.example.com").unwrap();
        assert_eq!(client.endpoint().as_str(), "https://agent.example.com/");
    }

    #[test]
    fn test_invalid_url() {
        assert!(A2aClient::new("not a valid url").is_err());
    }

    #[test]
    fn test_parse_sse_event() {
        let mut buffer = format!("data: {ARTIFACT_FRAME}\n\n").into_bytes();

        let frame = parse_sse_event(&mut buffer).unwrap().unwrap();
        let text = frame.result.as_ref().and_then(|r| r.artifact_text());
        assert_eq!(text, Some("hello"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_parse_crlf_framing() {
        let mut buffer = format!("event: message\r\ndata: {ARTIFACT_FRAME}\r\n\r\nda").into_bytes();

        assert!(parse_sse_event(&mut buffer).unwrap().is_ok());
        assert_eq!(buffer, b"da");
    }

    #[test]
    fn test_parse_skips_keepalive_comments() {
        let mut buffer = format!(": ping\n\ndata: {ARTIFACT_FRAME}\n\n").into_bytes();

        assert!(parse_sse_event(&mut buffer).unwrap().is_ok());
        assert!(parse_sse_event(&mut buffer).is_none());
    }

    #[test]
    fn test_parse_incomplete_sse_event() {
        let mut buffer = b"data: {\"incomplete\"".to_vec();

        assert!(parse_sse_event(&mut buffer).is_none());
        assert!(!buffer.is_empty());
    }

    #[test]
    fn test_parse_malformed_frame_is_protocol_error() {
        let mut buffer = b"data: {not json}\n\n".to_vec();

        let result = parse_sse_event(&mut buffer).unwrap();
        assert!(matches!(result, Err(A2aError::ProtocolError { .. })));
    }

    #[test]
    fn test_parse_error_frame_is_remote_error() {
        let mut buffer =
            b"data: {\"jsonrpc\":\"2.0\",\"id\":\"1\",\"error\":{\"code\":-32603,\"message\":\"boom\"}}\n\n"
                .to_vec();

        let result = parse_sse_event(&mut buffer).unwrap();
        assert!(matches!(result, Err(A2aError::Remote { code: -32603, .. })));
    }
}
