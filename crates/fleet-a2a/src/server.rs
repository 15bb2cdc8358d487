//! A2A Protocol Server
//!
//! Exposes one [`AgentExecutor`] over HTTP: the agent card at
//! `/.well-known/agent.json` and a JSON-RPC endpoint at `/` answering
//! `message/stream` with Server-Sent Events and `message/send` with a single
//! JSON response.
//!
//! # Example
//!
//! ```rust,ignore
//! use fleet_a2a::server::{A2aServer, AgentExecutor, ArtifactSink, RequestContext};
//! use fleet_a2a::AgentCard;
//!
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl AgentExecutor for Echo {
//!     async fn execute(&self, context: RequestContext, sink: ArtifactSink) {
//!         let _ = sink.stream_artifact(context.user_input()).await;
//!         let _ = sink.complete(None).await;
//!     }
//! }
//!
//! let server = A2aServer::new(AgentCard::new("echo", "http://localhost:3000/"), Echo);
//! server.serve("0.0.0.0:3000").await?;
//! ```

use async_trait::async_trait;
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use chrono::Utc;
use futures::Stream;
use serde_json::{Map, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{A2aError, A2aResult, JsonRpcError};
use crate::types::{
    AgentCard, Artifact, JsonRpcResponse, METHOD_MESSAGE_SEND, METHOD_MESSAGE_STREAM, Message,
    MessageSendParams, StreamResponse, StreamResult, Task, TaskArtifactUpdateEvent, TaskState,
    TaskStatus, TaskStatusUpdateEvent,
};

/// Events buffered between an executor and the response writer
const SINK_CAPACITY: usize = 32;

/// Request as seen by an executor
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub task_id: String,
    pub context_id: String,
    pub message: Message,
    /// `params.metadata` of the request
    pub metadata: Map<String, Value>,
}

impl RequestContext {
    /// Text of the incoming message
    pub fn user_input(&self) -> String {
        self.message.text()
    }

    /// String value of a request metadata key
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// What an executor reports back while it runs
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    /// A new text artifact
    Artifact(String),
    /// The task finished, optionally with a closing agent message
    Completed(Option<String>),
}

/// The receiving side is gone, usually because the caller disconnected
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("artifact sink closed")]
pub struct SinkClosed;

/// Channel an executor streams artifacts into
///
/// Every send fails with [`SinkClosed`] once the response stream has been
/// dropped, which is how executors notice a cancelled request.
#[derive(Debug, Clone)]
pub struct ArtifactSink {
    tx: mpsc::Sender<SinkEvent>,
}

impl ArtifactSink {
    /// Create a sink and the receiver that drains it
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SinkEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Emit one text artifact
    pub async fn stream_artifact(&self, text: impl Into<String>) -> Result<(), SinkClosed> {
        self.tx
            .send(SinkEvent::Artifact(text.into()))
            .await
            .map_err(|_| SinkClosed)
    }

    /// Mark the task completed
    pub async fn complete(&self, message: Option<String>) -> Result<(), SinkClosed> {
        self.tx
            .send(SinkEvent::Completed(message))
            .await
            .map_err(|_| SinkClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the receiving side is gone
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Business logic behind an A2A endpoint
///
/// An executor streams zero or more artifacts and then calls
/// [`ArtifactSink::complete`]. Returning without completing marks the task
/// failed.
#[async_trait]
pub trait AgentExecutor: Send + Sync + 'static {
    async fn execute(&self, context: RequestContext, sink: ArtifactSink);
}

#[async_trait]
impl<E: AgentExecutor + ?Sized> AgentExecutor for Arc<E> {
    async fn execute(&self, context: RequestContext, sink: ArtifactSink) {
        (**self).execute(context, sink).await
    }
}

struct AppState<E> {
    card: Arc<AgentCard>,
    artifact_name: Arc<str>,
    executor: Arc<E>,
}

impl<E> Clone for AppState<E> {
    fn clone(&self) -> Self {
        Self {
            card: Arc::clone(&self.card),
            artifact_name: Arc::clone(&self.artifact_name),
            executor: Arc::clone(&self.executor),
        }
    }
}

/// A2A Protocol Server
pub struct A2aServer<E: AgentExecutor> {
    card: Arc<AgentCard>,
    artifact_name: Arc<str>,
    executor: Arc<E>,
}

impl<E: AgentExecutor> A2aServer<E> {
    /// Serve `executor` under `card`; artifacts are named `<card.name>-result`
    pub fn new(card: AgentCard, executor: E) -> Self {
        let artifact_name: Arc<str> = format!("{}-result", card.name).into();
        Self {
            card: Arc::new(card),
            artifact_name,
            executor: Arc::new(executor),
        }
    }

    /// Override the name given to emitted artifacts
    pub fn with_artifact_name(mut self, name: impl Into<String>) -> Self {
        self.artifact_name = name.into().into();
        self
    }

    pub fn card(&self) -> &AgentCard {
        &self.card
    }

    /// Build the Axum router for this server
    pub fn router(&self) -> Router {
        let state = AppState {
            card: Arc::clone(&self.card),
            artifact_name: Arc::clone(&self.artifact_name),
            executor: Arc::clone(&self.executor),
        };

        Router::new()
            .route("/.well-known/agent.json", get(get_agent_card::<E>))
            .route("/.well-known/agent-card.json", get(get_agent_card::<E>))
            .route("/", post(handle_rpc::<E>))
            .with_state(state)
    }

    /// Serve on the given address until the process ends
    pub async fn serve(self, addr: &str) -> A2aResult<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| A2aError::internal_error(format!("Failed to bind to {}: {}", addr, e)))?;

        info!(name = %self.card.name, address = %addr, "A2A server starting");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| A2aError::internal_error(format!("Server error: {}", e)))
    }
}

/// GET /.well-known/agent.json
async fn get_agent_card<E: AgentExecutor>(State(state): State<AppState<E>>) -> Json<AgentCard> {
    Json((*state.card).clone())
}

/// POST / - JSON-RPC dispatch
async fn handle_rpc<E: AgentExecutor>(State(state): State<AppState<E>>, body: Bytes) -> Response {
    let request: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            return rpc_error(
                Value::Null,
                JsonRpcError::new(JsonRpcError::PARSE_ERROR, format!("Parse error: {e}")),
            );
        }
    };

    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let Some(method) = request.get("method").and_then(Value::as_str) else {
        return rpc_error(
            id,
            JsonRpcError::new(JsonRpcError::INVALID_REQUEST, "Missing method"),
        );
    };

    if method != METHOD_MESSAGE_STREAM && method != METHOD_MESSAGE_SEND {
        return rpc_error(id, JsonRpcError::method_not_found(method));
    }

    let params: MessageSendParams = match request.get("params").cloned() {
        Some(raw) => match serde_json::from_value(raw) {
            Ok(params) => params,
            Err(e) => {
                return rpc_error(
                    id,
                    JsonRpcError::new(
                        JsonRpcError::INVALID_PARAMS,
                        format!("Invalid params: {e}"),
                    ),
                );
            }
        },
        None => {
            return rpc_error(
                id,
                JsonRpcError::new(JsonRpcError::INVALID_PARAMS, "Missing params"),
            );
        }
    };

    if method == METHOD_MESSAGE_STREAM {
        stream_message(state, id, params).into_response()
    } else {
        send_message(state, id, params).await
    }
}

fn rpc_error(id: Value, error: JsonRpcError) -> Response {
    debug!(code = error.code, message = %error.message, "Rejecting JSON-RPC request");
    Json(JsonRpcResponse::<Value>::failure(id, error)).into_response()
}

/// Start the executor on its own task and hand back the receiving end
fn start_task<E: AgentExecutor>(
    state: &AppState<E>,
    params: MessageSendParams,
) -> (Task, mpsc::Receiver<SinkEvent>) {
    let task_id = params
        .message
        .task_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let context_id = params
        .message
        .context_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut task = Task::new(&task_id, &context_id, TaskState::Submitted);
    task.history.push(params.message.clone());

    let context = RequestContext {
        task_id,
        context_id,
        message: params.message,
        metadata: params.metadata.unwrap_or_default(),
    };

    let (sink, rx) = ArtifactSink::channel(SINK_CAPACITY);
    let executor = Arc::clone(&state.executor);
    tokio::spawn(async move {
        executor.execute(context, sink).await;
    });

    (task, rx)
}

struct TaskEvents {
    task_id: String,
    context_id: String,
    artifact_name: Arc<str>,
}

impl TaskEvents {
    fn artifact(&self, text: String) -> StreamResult {
        StreamResult::ArtifactUpdate(TaskArtifactUpdateEvent {
            task_id: self.task_id.clone(),
            context_id: self.context_id.clone(),
            artifact: Artifact::text(self.artifact_name.as_ref(), text),
            append: None,
            last_chunk: None,
            metadata: None,
        })
    }

    fn status(&self, state: TaskState, message: Option<String>, is_final: bool) -> StreamResult {
        let mut status = TaskStatus::new(state);
        status.timestamp = Some(Utc::now().to_rfc3339());
        if let Some(text) = message {
            status = status.with_message(
                Message::agent_text(text)
                    .with_task_id(&self.task_id)
                    .with_context_id(&self.context_id),
            );
        }
        StreamResult::StatusUpdate(TaskStatusUpdateEvent {
            task_id: self.task_id.clone(),
            context_id: self.context_id.clone(),
            status,
            is_final,
            metadata: None,
        })
    }
}

fn stream_message<E: AgentExecutor>(
    state: AppState<E>,
    id: Value,
    params: MessageSendParams,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (task, mut rx) = start_task(&state, params);
    let events = TaskEvents {
        task_id: task.id.clone(),
        context_id: task.context_id.clone(),
        artifact_name: Arc::clone(&state.artifact_name),
    };
    debug!(task_id = %task.id, "Streaming task started");

    let stream = async_stream::stream! {
        yield Ok(frame(&id, StreamResult::Task(task)));
        yield Ok(frame(&id, events.status(TaskState::Working, None, false)));

        loop {
            match rx.recv().await {
                Some(SinkEvent::Artifact(text)) => {
                    yield Ok(frame(&id, events.artifact(text)));
                }
                Some(SinkEvent::Completed(message)) => {
                    yield Ok(frame(&id, events.status(TaskState::Completed, message, true)));
                    break;
                }
                None => {
                    warn!(task_id = %events.task_id, "Executor ended without completing the task");
                    yield Ok(frame(&id, events.status(TaskState::Failed, None, true)));
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn send_message<E: AgentExecutor>(
    state: AppState<E>,
    id: Value,
    params: MessageSendParams,
) -> Response {
    let (mut task, mut rx) = start_task(&state, params);
    let events = TaskEvents {
        task_id: task.id.clone(),
        context_id: task.context_id.clone(),
        artifact_name: Arc::clone(&state.artifact_name),
    };

    let mut final_state = TaskState::Failed;
    while let Some(event) = rx.recv().await {
        match event {
            SinkEvent::Artifact(text) => {
                if let StreamResult::ArtifactUpdate(update) = events.artifact(text) {
                    task.artifacts.push(update.artifact);
                }
            }
            SinkEvent::Completed(message) => {
                final_state = TaskState::Completed;
                if let StreamResult::StatusUpdate(update) =
                    events.status(TaskState::Completed, message, true)
                {
                    task.status = update.status;
                }
                break;
            }
        }
    }
    if final_state == TaskState::Failed {
        task.status = TaskStatus::new(TaskState::Failed);
    }

    Json(JsonRpcResponse::success(id, StreamResult::Task(task))).into_response()
}

fn frame(id: &Value, result: StreamResult) -> Event {
    let response: StreamResponse = JsonRpcResponse::success(id.clone(), result);
    let data = serde_json::to_string(&response).unwrap_or_default();
    Event::default().data(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sink_reports_closed_receiver() {
        let (sink, rx) = ArtifactSink::channel(4);
        sink.stream_artifact("one").await.unwrap();
        drop(rx);

        assert!(sink.is_closed());
        assert_eq!(sink.stream_artifact("two").await, Err(SinkClosed));
        assert_eq!(sink.complete(None).await, Err(SinkClosed));
    }

    #[tokio::test]
    async fn test_sink_preserves_order() {
        let (sink, mut rx) = ArtifactSink::channel(4);
        sink.stream_artifact("a").await.unwrap();
        sink.stream_artifact("b").await.unwrap();
        sink.complete(Some(String::new())).await.unwrap();

        assert_eq!(rx.recv().await, Some(SinkEvent::Artifact("a".into())));
        assert_eq!(rx.recv().await, Some(SinkEvent::Artifact("b".into())));
        assert_eq!(rx.recv().await, Some(SinkEvent::Completed(Some(String::new()))));
    }

    #[test]
    fn test_request_context_accessors() {
        let mut metadata = Map::new();
        metadata.insert("user_id".into(), Value::String("u-1".into()));
        metadata.insert("n".into(), Value::from(3));
        let context = RequestContext {
            task_id: "t".into(),
            context_id: "c".into(),
            message: Message::user_text("question"),
            metadata,
        };

        assert_eq!(context.user_input(), "question");
        assert_eq!(context.metadata_str("user_id"), Some("u-1"));
        assert_eq!(context.metadata_str("n"), None);
        assert_eq!(context.metadata_str("missing"), None);
    }
}
