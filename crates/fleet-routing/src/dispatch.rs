//! Forwarding a query to the chosen agent and relaying its artifacts

use async_trait::async_trait;
use fleet_a2a::{
    A2aClient, A2aError, A2aResult, AgentCard, ArtifactSink, Message, MessageSendParams,
    ResponseStream, SendStreamingMessageRequest,
};
use futures::StreamExt;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::trace::TraceContext;

/// Opens a streamed reply from an expert agent
#[async_trait]
pub trait AgentDispatcher: Send + Sync {
    async fn open(
        &self,
        agent: &AgentCard,
        request: &SendStreamingMessageRequest,
    ) -> A2aResult<ResponseStream>;
}

/// [`AgentDispatcher`] speaking A2A `message/stream` over HTTP
#[derive(Debug, Clone)]
pub struct A2aDispatcher {
    http: Client,
    timeout: Duration,
}

impl A2aDispatcher {
    pub fn new(timeout: Duration) -> A2aResult<Self> {
        let http = Client::builder()
            .user_agent(format!("fleet-routing/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| A2aError::connection_error(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { http, timeout })
    }
}

#[async_trait]
impl AgentDispatcher for A2aDispatcher {
    async fn open(
        &self,
        agent: &AgentCard,
        request: &SendStreamingMessageRequest,
    ) -> A2aResult<ResponseStream> {
        A2aClient::with_http_client(&agent.url, self.http.clone())?
            .with_stream_timeout(self.timeout)
            .send_message_streaming(request)
            .await
    }
}

/// `message/stream` request carrying `query` and the trace ids
pub fn build_request(
    query: &str,
    agent: &AgentCard,
    trace: &TraceContext,
) -> SendStreamingMessageRequest {
    SendStreamingMessageRequest::stream(
        MessageSendParams::new(Message::user_text(query))
            .with_metadata(trace.dispatch_metadata(&agent.name)),
    )
}

/// How a relay ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    /// The upstream stream finished
    Finished { relayed: usize },
    /// The upstream failed; `relayed` artifacts made it through first
    Failed { relayed: usize },
    /// The caller went away
    Cancelled { relayed: usize },
}

/// Copy the first text part of every artifact update into `sink`
///
/// Undecodable frames are skipped. Stops at the first other upstream error
/// and as soon as the sink closes, even while waiting on the upstream. The
/// first final status ends the relay; frames the upstream sends after it are
/// not read.
pub async fn relay(mut stream: ResponseStream, sink: &ArtifactSink, agent_url: &str) -> RelayEnd {
    let mut relayed = 0;
    loop {
        let next = tokio::select! {
            _ = sink.closed() => {
                info!(agent_url = %agent_url, relayed, "Caller went away, dropping upstream");
                return RelayEnd::Cancelled { relayed };
            }
            next = stream.next() => next,
        };
        let frame = match next {
            None => return RelayEnd::Finished { relayed },
            Some(Ok(frame)) => frame,
            Some(Err(e @ A2aError::ProtocolError { .. })) => {
                warn!(agent_url = %agent_url, error = %e, "Skipping undecodable upstream frame");
                continue;
            }
            Some(Err(e)) => {
                warn!(agent_url = %agent_url, error = %e, relayed, "Upstream agent failed");
                return RelayEnd::Failed { relayed };
            }
        };
        if let Some(error) = frame.error {
            warn!(
                agent_url = %agent_url,
                code = error.code,
                message = %error.message,
                "Upstream agent answered with an error"
            );
            return RelayEnd::Failed { relayed };
        }
        let Some(result) = frame.result else {
            continue;
        };
        if let Some(text) = result.artifact_text() {
            if sink.stream_artifact(text).await.is_err() {
                info!(agent_url = %agent_url, relayed, "Caller went away, dropping upstream");
                return RelayEnd::Cancelled { relayed };
            }
            relayed += 1;
        }
        if result.is_final() {
            debug!(agent_url = %agent_url, relayed, "Upstream finished");
            return RelayEnd::Finished { relayed };
        }
    }
}
