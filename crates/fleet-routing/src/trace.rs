//! Identifiers carried through one routed request

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Who asked, which run it belongs to, and the trace that ties the hops together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    pub user_id: String,
    pub run_id: String,
    pub request_id: String,
    /// First 32 hex characters of SHA-256 over `request_id`
    pub trace_id: String,
}

impl TraceContext {
    pub fn new(
        user_id: impl Into<String>,
        run_id: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        let request_id = request_id.into();
        Self {
            user_id: user_id.into(),
            run_id: run_id.into(),
            trace_id: trace_id_for(&request_id),
            request_id,
        }
    }

    /// Read `user_id` and `run_id` from request metadata
    ///
    /// Missing or empty ids get fresh UUIDs, as does the request id.
    pub fn from_metadata(metadata: &Map<String, Value>) -> Self {
        let id = |key: &str| {
            metadata
                .get(key)
                .and_then(Value::as_str)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string())
        };
        Self::new(id("user_id"), id("run_id"), Uuid::new_v4().to_string())
    }

    /// Metadata sent along with the dispatched message
    pub fn dispatch_metadata(&self, agent_id: &str) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert("user_id".into(), Value::String(self.user_id.clone()));
        metadata.insert("agent_id".into(), Value::String(agent_id.to_string()));
        metadata.insert("run_id".into(), Value::String(self.run_id.clone()));
        metadata.insert("trace_id".into(), Value::String(self.trace_id.clone()));
        metadata
    }
}

pub fn trace_id_for(seed: &str) -> String {
    let digest = Sha256::digest(seed.as_bytes());
    let mut hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex.truncate(32);
    hex
}
