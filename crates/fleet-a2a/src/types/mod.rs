//! A2A protocol types

mod agent_card;
mod message;
mod part;
mod rpc;
mod streaming;
mod task;

pub use agent_card::{AgentCard, AgentSkill};
pub use message::{Message, Role};
pub use part::{DataPart, FilePart, Part, TextPart};
pub use rpc::{
    JSONRPC_VERSION, JsonRpcRequest, JsonRpcResponse, METHOD_MESSAGE_SEND, METHOD_MESSAGE_STREAM,
    MessageSendParams, SendStreamingMessageRequest, StreamResponse,
};
pub use streaming::{StreamResult, TaskArtifactUpdateEvent, TaskStatusUpdateEvent};
pub use task::{Artifact, Task, TaskState, TaskStatus};
