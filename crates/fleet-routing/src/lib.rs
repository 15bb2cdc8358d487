//! # fleet-routing
//!
//! The routing agent: an A2A executor that answers each query by finding
//! candidate agents in the semantic index, letting an LLM planner choose one
//! of them by name, and relaying the chosen agent's streamed artifacts.
//!
//! ```rust,no_run
//! use fleet_a2a::{A2aServer, AgentCard};
//! use fleet_routing::{LlmConfig, RoutingConfig, RoutingExecutor};
//! use fleet_vector::{DataServicesIndex, IndexConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let index = Arc::new(DataServicesIndex::new(IndexConfig::default())?);
//! let executor = RoutingExecutor::from_config(index, &LlmConfig::default(), &RoutingConfig::default())?;
//! let card = AgentCard::new("router", "http://localhost:10100/");
//! A2aServer::new(card, executor).serve("0.0.0.0:10100").await?;
//! # Ok(())
//! # }
//! ```

pub mod candidates;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod llm;
pub mod plan;
pub mod planner;
pub mod trace;

pub use candidates::{CandidateRetriever, descriptor_of};
pub use config::{LlmConfig, RoutingConfig};
pub use dispatch::{A2aDispatcher, AgentDispatcher, RelayEnd, build_request, relay};
pub use error::{LlmError, LlmResult, PlannerError, RoutingError};
pub use executor::{NO_CANDIDATES_MESSAGE, NO_MATCH_MESSAGE, RoutingExecutor};
pub use llm::{ChatMessage, ChatModel, OpenAiCompatibleChat, chat_model};
pub use plan::{RoutingPlan, decode_plan};
pub use planner::{LlmPlanner, Planner, format_candidates, format_skills, system_prompt};
pub use trace::{TraceContext, trace_id_for};
