//! The routing agent's request pipeline
//!
//! Candidates come from the semantic index, the planner picks at most one of
//! them by name, and the chosen agent's streamed artifacts are relayed back
//! verbatim. Every path completes the task except a failed candidate search,
//! which leaves it to the server to mark the task failed.

use async_trait::async_trait;
use fleet_a2a::{AgentExecutor, ArtifactSink, RequestContext};
use fleet_observability::{FleetMetrics, RoutingOutcome};
use fleet_vector::SemanticIndex;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, error, info, info_span, warn};

use crate::candidates::CandidateRetriever;
use crate::config::{LlmConfig, RoutingConfig};
use crate::dispatch::{A2aDispatcher, AgentDispatcher, RelayEnd, build_request, relay};
use crate::error::RoutingError;
use crate::llm::chat_model;
use crate::plan::RoutingPlan;
use crate::planner::{LlmPlanner, Planner};
use crate::trace::TraceContext;

pub const NO_CANDIDATES_MESSAGE: &str =
    "No enough information to handle your question. You can provide more information.";
pub const NO_MATCH_MESSAGE: &str = "Not found agents. You can provide more information.";

pub struct RoutingExecutor {
    candidates: CandidateRetriever,
    planner: Arc<dyn Planner>,
    dispatcher: Arc<dyn AgentDispatcher>,
    metrics: Option<FleetMetrics>,
}

impl RoutingExecutor {
    pub fn new(
        index: Arc<dyn SemanticIndex>,
        planner: Arc<dyn Planner>,
        dispatcher: Arc<dyn AgentDispatcher>,
        config: &RoutingConfig,
    ) -> Self {
        Self {
            candidates: CandidateRetriever::new(index, config),
            planner,
            dispatcher,
            metrics: None,
        }
    }

    /// Executor planning with the configured chat model and dispatching over A2A
    pub fn from_config(
        index: Arc<dyn SemanticIndex>,
        llm: &LlmConfig,
        routing: &RoutingConfig,
    ) -> Result<Self, RoutingError> {
        let planner = LlmPlanner::new(chat_model(llm)?);
        let dispatcher = A2aDispatcher::new(routing.upstream_timeout)?;
        Ok(Self::new(
            index,
            Arc::new(planner),
            Arc::new(dispatcher),
            routing,
        ))
    }

    pub fn with_metrics(mut self, metrics: FleetMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Route one query, streaming into `sink`
    pub async fn route(
        &self,
        query: &str,
        trace: &TraceContext,
        sink: &ArtifactSink,
    ) -> RoutingOutcome {
        let candidates = match self.candidates.retrieve(query).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(error = %e, "Candidate search failed");
                return RoutingOutcome::IndexError;
            }
        };
        if candidates.is_empty() {
            info!("No candidate agents");
            return reply(sink, NO_CANDIDATES_MESSAGE, RoutingOutcome::NoCandidates).await;
        }

        let plan = match self.planner.plan(query, &candidates, trace).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!(error = %e, "Planner failed");
                RoutingPlan::no_match(query)
            }
        };
        let Some(agent) = plan.select(&candidates) else {
            info!(agent = %plan.agent, candidates = candidates.len(), "No agent selected");
            return reply(sink, NO_MATCH_MESSAGE, RoutingOutcome::NoMatch).await;
        };
        info!(agent = %agent.name, agent_url = %agent.url, "Dispatching");

        let request = build_request(query, agent, trace);
        let outcome = match self.dispatcher.open(agent, &request).await {
            Ok(stream) => match relay(stream, sink, &agent.url).await {
                RelayEnd::Finished { .. } => RoutingOutcome::Dispatched,
                RelayEnd::Failed { .. } => RoutingOutcome::UpstreamError,
                RelayEnd::Cancelled { .. } => return RoutingOutcome::Cancelled,
            },
            Err(e) => {
                error!(agent_url = %agent.url, error = %e, "Could not reach the selected agent");
                RoutingOutcome::UpstreamError
            }
        };
        complete(sink, outcome).await
    }
}

async fn reply(sink: &ArtifactSink, text: &str, outcome: RoutingOutcome) -> RoutingOutcome {
    if sink.stream_artifact(text).await.is_err() {
        return RoutingOutcome::Cancelled;
    }
    complete(sink, outcome).await
}

async fn complete(sink: &ArtifactSink, outcome: RoutingOutcome) -> RoutingOutcome {
    match sink.complete(None).await {
        Ok(()) => outcome,
        Err(_) => RoutingOutcome::Cancelled,
    }
}

#[async_trait]
impl AgentExecutor for RoutingExecutor {
    async fn execute(&self, context: RequestContext, sink: ArtifactSink) {
        let started = Instant::now();
        let trace = TraceContext::from_metadata(&context.metadata);
        let query = context.user_input();
        let span = info_span!(
            "routing.request",
            task_id = %context.task_id,
            trace_id = %trace.trace_id,
            user_id = %trace.user_id,
            run_id = %trace.run_id,
        );

        let outcome = self.route(&query, &trace, &sink).instrument(span).await;
        info!(
            task_id = %context.task_id,
            trace_id = %trace.trace_id,
            outcome = outcome.as_str(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Routing finished"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_routing(outcome, started.elapsed());
        }
    }
}
