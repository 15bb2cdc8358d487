//! Agent Card types for capability discovery in the A2A protocol.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{A2aError, A2aResult};

/// Agent Card: the self-description an agent publishes
///
/// Only the fields the fleet reasons about are typed. Everything else an
/// agent advertises (capabilities, input modes, provider, version) is kept
/// verbatim in `extra` so a card survives a decode/encode cycle unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    /// Human-readable name of the agent
    pub name: String,

    /// Description of the agent
    #[serde(default)]
    pub description: String,

    /// Endpoint the agent accepts JSON-RPC requests on; also its identity
    /// in the registry
    pub url: String,

    /// Skills the agent can perform
    #[serde(default)]
    pub skills: Vec<AgentSkill>,

    /// Fields not modelled above
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AgentCard {
    /// Create a new agent card with required fields
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            url: url.into(),
            skills: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a skill to the agent card
    pub fn with_skill(mut self, skill: AgentSkill) -> Self {
        self.skills.push(skill);
        self
    }

    /// Advertise streaming support under `capabilities`
    pub fn with_streaming(mut self) -> Self {
        let capabilities = self
            .extra
            .entry("capabilities")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(caps) = capabilities {
            caps.insert("streaming".to_string(), Value::Bool(true));
        }
        self
    }

    /// Decode a card from its JSON text
    pub fn from_json(text: &str) -> A2aResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode the card as compact JSON
    pub fn to_json(&self) -> A2aResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Check that the card can be registered and addressed
    pub fn validate(&self) -> A2aResult<()> {
        if self.name.trim().is_empty() {
            return Err(A2aError::invalid_agent_card("name is empty"));
        }
        let url = url::Url::parse(&self.url)
            .map_err(|e| A2aError::invalid_agent_card(format!("url {:?}: {e}", self.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(A2aError::invalid_agent_card(format!(
                "url {:?} is not http(s)",
                self.url
            )));
        }
        Ok(())
    }
}

/// A skill that an agent can perform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSkill {
    /// Unique skill identifier
    pub id: String,

    /// Human-readable skill name
    pub name: String,

    /// Description of the skill
    #[serde(default)]
    pub description: String,

    /// Tags for categorization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,

    /// Example prompts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examples: Option<Vec<String>>,

    /// Fields not modelled above
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AgentSkill {
    /// Create a new skill
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            tags: None,
            examples: None,
            extra: Map::new(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set tags
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Set example prompts
    pub fn with_examples<I, S>(mut self, examples: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.examples = Some(examples.into_iter().map(Into::into).collect());
        self
    }
}
