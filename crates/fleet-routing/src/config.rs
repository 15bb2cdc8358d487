//! Planner model and routing settings

use fleet_vector::SearchMode;
use std::time::Duration;

pub const DEFAULT_LLM_PROVIDER: &str = "openai_compatible";
pub const DEFAULT_LLM_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
pub const DEFAULT_LLM_MODEL: &str = "qwen2.5-72b-instruct";
pub const DEFAULT_ROUTING_COLLECTION: &str = "orchestrator_agent_cards";

/// Chat model settings
#[derive(Clone)]
pub struct LlmConfig {
    pub provider: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_LLM_PROVIDER.to_string(),
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_LLM_MODEL.to_string(),
            temperature: 0.01,
            timeout: Duration::from_secs(60),
        }
    }
}

impl LlmConfig {
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// How the executor finds candidates and talks to the chosen agent
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingConfig {
    /// Collection searched for candidates
    pub collection: String,
    /// Candidates handed to the planner
    pub top_k: usize,
    pub search_mode: SearchMode,
    /// Bound on one streamed upstream reply
    pub upstream_timeout: Duration,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_ROUTING_COLLECTION.to_string(),
            top_k: 10,
            search_mode: SearchMode::Vector,
            upstream_timeout: Duration::from_secs(300),
        }
    }
}

impl RoutingConfig {
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_search_mode(mut self, mode: SearchMode) -> Self {
        self.search_mode = mode;
        self
    }

    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let llm = LlmConfig::default();
        assert_eq!(llm.provider, "openai_compatible");
        assert_eq!(llm.model, "qwen2.5-72b-instruct");
        assert!((llm.temperature - 0.01).abs() < f32::EPSILON);

        let routing = RoutingConfig::default();
        assert_eq!(routing.collection, "orchestrator_agent_cards");
        assert_eq!(routing.top_k, 10);
        assert_eq!(routing.search_mode, SearchMode::Vector);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let rendered = format!("{:?}", LlmConfig::default().with_api_key("sk-secret"));
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("REDACTED"));
    }
}
