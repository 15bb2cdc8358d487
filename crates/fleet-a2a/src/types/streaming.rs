//! Streaming event payloads carried in `result` of a `message/stream` reply

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    message::Message,
    task::{Artifact, Task, TaskStatus},
};

/// One chunk of a streamed reply, discriminated by `kind`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StreamResult {
    Task(Task),
    Message(Message),
    StatusUpdate(TaskStatusUpdateEvent),
    ArtifactUpdate(TaskArtifactUpdateEvent),
}

impl StreamResult {
    /// Text of the first part of an artifact update
    ///
    /// `None` for other chunk kinds, for non-text first parts, and for
    /// empty text.
    pub fn artifact_text(&self) -> Option<&str> {
        match self {
            StreamResult::ArtifactUpdate(update) => update
                .artifact
                .parts
                .first()
                .and_then(|part| part.as_text())
                .filter(|text| !text.is_empty()),
            _ => None,
        }
    }

    /// Whether this chunk ends the stream
    pub fn is_final(&self) -> bool {
        match self {
            StreamResult::StatusUpdate(update) => update.is_final || update.status.state.is_terminal(),
            StreamResult::Message(_) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusUpdateEvent {
    pub task_id: String,
    pub context_id: String,
    pub status: TaskStatus,
    #[serde(rename = "final", default)]
    pub is_final: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskArtifactUpdateEvent {
    pub task_id: String,
    pub context_id: String,
    pub artifact: Artifact,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub append: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_chunk: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}
