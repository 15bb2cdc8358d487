//! JSON-RPC 2.0 envelopes

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{message::Message, streaming::StreamResult};
use crate::error::JsonRpcError;

pub const JSONRPC_VERSION: &str = "2.0";

/// Streamed send: the reply is an SSE stream of [`StreamResponse`]
pub const METHOD_MESSAGE_STREAM: &str = "message/stream";
/// Blocking send: the reply is a single JSON-RPC response
pub const METHOD_MESSAGE_SEND: &str = "message/send";

/// A JSON-RPC request with typed params
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest<P> {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    pub params: P,
}

impl<P> JsonRpcRequest<P> {
    /// A request with a fresh hex id
    pub fn new(method: impl Into<String>, params: P) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Value::String(uuid::Uuid::new_v4().simple().to_string()),
            method: method.into(),
            params,
        }
    }
}

/// Params of `message/send` and `message/stream`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSendParams {
    pub message: Message,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl MessageSendParams {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            configuration: None,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// `message/stream` request
pub type SendStreamingMessageRequest = JsonRpcRequest<MessageSendParams>;

impl SendStreamingMessageRequest {
    pub fn stream(params: MessageSendParams) -> Self {
        Self::new(METHOD_MESSAGE_STREAM, params)
    }
}

/// A JSON-RPC response carrying either a result or an error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "R: Deserialize<'de>"))]
pub struct JsonRpcResponse<R> {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<R>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl<R> JsonRpcResponse<R> {
    pub fn success(id: Value, result: R) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// One SSE frame of a `message/stream` reply
pub type StreamResponse = JsonRpcResponse<StreamResult>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Part;
    use serde_json::json;

    #[test]
    fn test_stream_request_shape() {
        let mut metadata = Map::new();
        metadata.insert("trace_id".into(), json!("abc"));
        let request = SendStreamingMessageRequest::stream(
            MessageSendParams::new(Message::user_text("hello")).with_metadata(metadata),
        );

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["method"], "message/stream");
        assert_eq!(json["id"].as_str().unwrap().len(), 32);
        assert_eq!(json["params"]["message"]["parts"][0]["text"], "hello");
        assert_eq!(json["params"]["metadata"]["trace_id"], "abc");
        assert!(json["params"].get("configuration").is_none());
    }

    #[test]
    fn test_stream_response_with_error() {
        let frame: StreamResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 7,
            "error": {"code": -32603, "message": "upstream failed"}
        }))
        .unwrap();
        assert!(frame.result.is_none());
        assert_eq!(frame.error.unwrap().code, -32603);
    }

    #[test]
    fn test_stream_response_with_result() {
        let frame: StreamResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": "x",
            "result": {
                "kind": "message",
                "role": "agent",
                "messageId": "m1",
                "parts": [{"kind": "text", "text": "hi"}]
            }
        }))
        .unwrap();
        match frame.result.unwrap() {
            StreamResult::Message(msg) => assert_eq!(msg.parts, vec![Part::text("hi")]),
            other => panic!("unexpected chunk {other:?}"),
        }
    }
}
