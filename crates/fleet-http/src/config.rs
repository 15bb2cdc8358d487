//! # Environment-Based Configuration
//!
//! Every service reads the same set of variables; each binary uses the
//! parts it needs.
//!
//! ### Substrate
//! - `REDIS_HOST` (default: localhost), `REDIS_PORT` (6379), `REDIS_DB` (0)
//! - `REDIS_PASSWORD` - unset means no AUTH
//!
//! ### Registry
//! - `FLEET_HEARTBEAT_TIMEOUT_SECS` - heartbeat age after which an agent is reaped (30)
//! - `FLEET_REAP_INTERVAL_SECS` - pause between reaper sweeps (60)
//! - `FLEET_REAP_RETRY_SECS` - pause after a failed sweep (30)
//! - `FLEET_REQUIRE_HEARTBEAT` - reap descriptors with no heartbeat entry (false)
//!
//! ### Semantic index
//! - `DATA_SERVICES` - base url of the index service
//! - `COLLECTION_NAME` - mirror collection (agent_cards)
//! - `FLEET_MIRROR_QUEUE_CAPACITY` - changes the mirror may fall behind by before it resyncs (1024)
//! - `ROUTING_COLLECTION_NAME` - collection the router searches (orchestrator_agent_cards)
//! - `ROUTING_TOP_K` - candidates handed to the planner (10)
//!
//! ### Planner model
//! - `LLM_PROVIDER` (openai_compatible), `LLM_BASE_URL`, `LLM_API_KEY`, `LLM_MODEL`
//! - `LLM_TEMPERATURE` (0.01), `LLM_TIMEOUT_SECS` (60)
//! - `FLEET_UPSTREAM_TIMEOUT_SECS` - bound on one relayed upstream reply (300)
//!
//! ### HTTP
//! - `FLEET_API_HOST` (0.0.0.0), `FLEET_API_PORT` (8000), `FLEET_CORS_ENABLED` (true)

use fleet_kv::RedisConfig;
use fleet_registry::{MirrorConfig, RegistryConfig};
use fleet_routing::{LlmConfig, RoutingConfig};
use fleet_vector::IndexConfig;
use std::{env, time::Duration};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid environment variable '{key}': {message}")]
    InvalidEnvVar { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Listener settings of an HTTP surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpServiceConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
}

impl Default for HttpServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            enable_cors: true,
        }
    }
}

impl HttpServiceConfig {
    /// `host:port`, tolerating a scheme prefix on the host
    pub fn address(&self) -> String {
        let host = self.host.rsplit("//").next().unwrap_or(&self.host);
        format!("{host}:{}", self.port)
    }
}

/// Everything a fleet service can be configured with
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub redis: RedisConfig,
    pub registry: RegistryConfig,
    pub index: IndexConfig,
    pub mirror: MirrorConfig,
    pub llm: LlmConfig,
    pub routing: RoutingConfig,
    pub http: HttpServiceConfig,
}

/// Builder for [`ServiceConfig`] with environment variable support
#[derive(Debug, Clone)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl Default for ServiceConfigBuilder {
    fn default() -> Self {
        Self {
            config: ServiceConfig {
                redis: RedisConfig::default(),
                registry: RegistryConfig::default(),
                index: IndexConfig::default(),
                mirror: MirrorConfig::default(),
                llm: LlmConfig::default(),
                routing: RoutingConfig::default(),
                http: HttpServiceConfig::default(),
            },
        }
    }
}

impl ServiceConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if a variable is set but does
    /// not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars(&lookup);
        let mut builder = Self::default();
        let config = &mut builder.config;

        // Substrate
        if let Some(host) = vars.string("REDIS_HOST") {
            config.redis.host = host;
        }
        if let Some(port) = vars.parse::<u16>("REDIS_PORT")? {
            config.redis.port = port;
        }
        if let Some(db) = vars.parse::<i64>("REDIS_DB")? {
            config.redis.db = db;
        }
        if let Some(password) = vars.string("REDIS_PASSWORD").filter(|p| !p.is_empty()) {
            config.redis.password = Some(password);
        }

        // Registry
        if let Some(secs) = vars.parse::<u64>("FLEET_HEARTBEAT_TIMEOUT_SECS")? {
            config.registry.heartbeat_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = vars.parse::<u64>("FLEET_REAP_INTERVAL_SECS")? {
            config.registry.reap_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = vars.parse::<u64>("FLEET_REAP_RETRY_SECS")? {
            config.registry.reap_retry = Duration::from_secs(secs);
        }
        if let Some(require) = vars.bool("FLEET_REQUIRE_HEARTBEAT")? {
            config.registry.require_heartbeat = require;
        }

        // Semantic index
        if let Some(url) = vars.string("DATA_SERVICES") {
            config.index.base_url = url;
        }
        if let Some(collection) = vars.string("COLLECTION_NAME") {
            config.mirror.collection = collection;
        }
        if let Some(capacity) = vars.parse::<usize>("FLEET_MIRROR_QUEUE_CAPACITY")? {
            config.mirror.queue_capacity = capacity;
        }
        if let Some(collection) = vars.string("ROUTING_COLLECTION_NAME") {
            config.routing.collection = collection;
        }
        if let Some(top_k) = vars.parse::<usize>("ROUTING_TOP_K")? {
            config.routing.top_k = top_k;
        }

        // Planner model
        if let Some(provider) = vars.string("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Some(url) = vars.string("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Some(key) = vars.string("LLM_API_KEY").filter(|k| !k.is_empty()) {
            config.llm.api_key = Some(key);
        }
        if let Some(model) = vars.string("LLM_MODEL") {
            config.llm.model = model;
        }
        if let Some(temperature) = vars.parse::<f32>("LLM_TEMPERATURE")? {
            config.llm.temperature = temperature;
        }
        if let Some(secs) = vars.parse::<u64>("LLM_TIMEOUT_SECS")? {
            config.llm.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = vars.parse::<u64>("FLEET_UPSTREAM_TIMEOUT_SECS")? {
            config.routing.upstream_timeout = Duration::from_secs(secs);
        }

        // HTTP
        if let Some(host) = vars.string("FLEET_API_HOST") {
            config.http.host = host;
        }
        if let Some(port) = vars.parse::<u16>("FLEET_API_PORT")? {
            config.http.port = port;
        }
        if let Some(cors) = vars.bool("FLEET_CORS_ENABLED")? {
            config.http.enable_cors = cors;
        }

        Ok(builder)
    }

    #[must_use]
    pub fn redis_host(mut self, host: impl Into<String>) -> Self {
        self.config.redis.host = host.into();
        self
    }

    #[must_use]
    pub fn redis_port(mut self, port: u16) -> Self {
        self.config.redis.port = port;
        self
    }

    #[must_use]
    pub fn redis_db(mut self, db: i64) -> Self {
        self.config.redis.db = db;
        self
    }

    #[must_use]
    pub fn redis_password(mut self, password: Option<String>) -> Self {
        self.config.redis.password = password;
        self
    }

    #[must_use]
    pub fn api_host(mut self, host: impl Into<String>) -> Self {
        self.config.http.host = host.into();
        self
    }

    #[must_use]
    pub fn api_port(mut self, port: u16) -> Self {
        self.config.http.port = port;
        self
    }

    #[must_use]
    pub fn data_services(mut self, url: impl Into<String>) -> Self {
        self.config.index.base_url = url.into();
        self
    }

    #[must_use]
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.config.mirror.collection = collection.into();
        self
    }

    /// Validate and build
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if the configuration is invalid.
    pub fn build(self) -> Result<ServiceConfig, ConfigError> {
        self.validate()?;
        Ok(self.config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let config = &self.config;
        let invalid = |message: &str| Err(ConfigError::ValidationError(message.to_string()));

        if config.redis.host.trim().is_empty() {
            return invalid("redis host cannot be empty");
        }
        if config.redis.db < 0 {
            return invalid("redis db must be >= 0");
        }
        if config.registry.heartbeat_timeout.is_zero() {
            return invalid("heartbeat timeout must be greater than 0");
        }
        if config.registry.reap_interval.is_zero() {
            return invalid("reap interval must be greater than 0");
        }
        if config.registry.reap_retry.is_zero() {
            return invalid("reap retry must be greater than 0");
        }
        if config.mirror.collection.trim().is_empty() {
            return invalid("mirror collection cannot be empty");
        }
        if config.mirror.queue_capacity == 0 {
            return invalid("mirror queue capacity must be greater than 0");
        }
        if config.routing.collection.trim().is_empty() {
            return invalid("routing collection cannot be empty");
        }
        if config.routing.top_k == 0 {
            return invalid("routing top_k must be greater than 0");
        }
        if config.routing.upstream_timeout.is_zero() {
            return invalid("upstream timeout must be greater than 0");
        }
        if !(0.0..=2.0).contains(&config.llm.temperature) {
            return invalid("llm temperature must be between 0.0 and 2.0");
        }
        if config.llm.timeout.is_zero() {
            return invalid("llm timeout must be greater than 0");
        }
        if config.http.host.trim().is_empty() {
            return invalid("api host cannot be empty");
        }
        Ok(())
    }
}

/// Typed reads over a lookup function
struct Vars<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Vars<'_> {
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn parse<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.string(key) {
            Some(val) => val
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| ConfigError::InvalidEnvVar {
                    key: key.to_string(),
                    message: format!("invalid value '{val}': {e}"),
                }),
            None => Ok(None),
        }
    }

    fn bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        match self.string(key) {
            Some(val) => match val.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(Some(true)),
                "false" | "0" | "no" | "off" => Ok(Some(false)),
                _ => Err(ConfigError::InvalidEnvVar {
                    key: key.to_string(),
                    message: format!(
                        "invalid boolean value '{val}', expected true/false/1/0/yes/no/on/off"
                    ),
                }),
            },
            None => Ok(None),
        }
    }
}
