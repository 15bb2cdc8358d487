//! Chat model used by the planner
//!
//! The planner only needs one non-streaming completion per request, so
//! [`ChatModel`] is a single call from a system prompt and a human prompt to
//! the answer text. [`OpenAiCompatibleChat`] speaks the OpenAI chat
//! completions dialect, which DashScope and most self-hosted gateways accept.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::{LlmError, LlmResult};

/// A model that answers one system + human exchange
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, system: &str, human: &str) -> LlmResult<String>;
}

#[async_trait]
impl<M: ChatModel + ?Sized> ChatModel for Arc<M> {
    async fn complete(&self, system: &str, human: &str) -> LlmResult<String> {
        (**self).complete(system, human).await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    stream: bool,
    /// Qwen models reason before answering unless told not to
    enable_thinking: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// OpenAI-style `POST {base_url}/chat/completions` client
pub struct OpenAiCompatibleChat {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl OpenAiCompatibleChat {
    pub fn new(config: &LlmConfig) -> LlmResult<Self> {
        url::Url::parse(&config.base_url)
            .map_err(|e| LlmError::InvalidConfig(format!("{}: {e}", config.base_url)))?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl std::fmt::Debug for OpenAiCompatibleChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleChat")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .finish()
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatibleChat {
    async fn complete(&self, system: &str, human: &str) -> LlmResult<String> {
        let body = CompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage::system(system), ChatMessage::user(human)],
            temperature: self.temperature,
            stream: false,
            enable_thinking: false,
        };
        let url = format!("{}/chat/completions", self.base_url);
        debug!(url = %url, model = %self.model, "Chat completion request");

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = serde_json::from_str::<ApiError>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited(message),
                _ => LlmError::Api {
                    status: status.as_u16(),
                    message,
                },
            });
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse response: {e}")))?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("response has no message content".into()))
    }
}

/// Build the chat model named by `config.provider`
pub fn chat_model(config: &LlmConfig) -> LlmResult<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "openai_compatible" | "openai" | "dashscope" => {
            Ok(Arc::new(OpenAiCompatibleChat::new(config)?))
        }
        other => Err(LlmError::InvalidConfig(format!(
            "unsupported LLM provider: {other}"
        ))),
    }
}
