//! Choosing one candidate for a query
//!
//! [`LlmPlanner`] lists the candidates in the system prompt, asks the chat
//! model for a `{original_query, agent}` object and salvages the answer with
//! [`decode_plan`]. A name that is not one of the candidates is turned into
//! an empty plan so the caller only ever sees a candidate name or `""`.

use async_trait::async_trait;
use fleet_a2a::{AgentCard, AgentSkill};
use tracing::{Instrument, Span, field, info, info_span};

use crate::error::PlannerError;
use crate::llm::ChatModel;
use crate::plan::{RoutingPlan, decode_plan};
use crate::trace::TraceContext;

#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(
        &self,
        query: &str,
        candidates: &[AgentCard],
        trace: &TraceContext,
    ) -> Result<RoutingPlan, PlannerError>;
}

/// Planner backed by a chat model
pub struct LlmPlanner<M> {
    model: M,
}

impl<M: ChatModel> LlmPlanner<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }
}

#[async_trait]
impl<M: ChatModel> Planner for LlmPlanner<M> {
    async fn plan(
        &self,
        query: &str,
        candidates: &[AgentCard],
        trace: &TraceContext,
    ) -> Result<RoutingPlan, PlannerError> {
        let span = info_span!(
            "routing.plan",
            trace_id = %trace.trace_id,
            user_id = %trace.user_id,
            run_id = %trace.run_id,
            plan.input = %query,
            plan.output = field::Empty,
        );
        let system = system_prompt(candidates);

        async {
            let answer = self.model.complete(&system, query).await?;
            Span::current().record("plan.output", answer.as_str());

            let plan = decode_plan(&answer, query);
            if plan.is_match() && plan.select(candidates).is_none() {
                info!(agent = %plan.agent, "Planner named an agent outside the candidates");
                return Ok(RoutingPlan::no_match(plan.original_query));
            }
            Ok(plan)
        }
        .instrument(span)
        .await
    }
}

/// System prompt listing `candidates` and the expected answer format
pub fn system_prompt(candidates: &[AgentCard]) -> String {
    format!(
        "You are a routing assistant. Pick the single agent below that is best able to \
         handle the user's question.\n\n\
         Available agents:\n\n{}\n\n\
         Rules:\n\
         - Answer with one JSON object and nothing else.\n\
         - \"original_query\" repeats the user's question verbatim.\n\
         - \"agent\" is the exact name of the chosen agent, or \"\" when no agent fits.\n\n\
         Example:\n\
         {{\"original_query\": \"Write a function that sorts a list\", \"agent\": \"coder-agent\"}}",
        format_candidates(candidates)
    )
}

/// `{i}. agent name: .., description: .., skills: ..`, one paragraph per agent
pub fn format_candidates(candidates: &[AgentCard]) -> String {
    candidates
        .iter()
        .enumerate()
        .map(|(i, card)| {
            format!(
                "{}. agent name: {}, description: {}, skills: {}",
                i + 1,
                card.name,
                card.description,
                format_skills(&card.skills)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn format_skills(skills: &[AgentSkill]) -> String {
    skills
        .iter()
        .enumerate()
        .map(|(i, skill)| {
            let mut block = format!(
                "Skill {}:\n  ID: {}\n  Name: {}\n  Description: {}",
                i + 1,
                skill.id,
                skill.name,
                skill.description
            );
            if let Some(tags) = skill.tags.as_ref().filter(|t| !t.is_empty()) {
                block.push_str(&format!("\n  Tags: {}", tags.join(", ")));
            }
            if let Some(examples) = skill.examples.as_ref().filter(|e| !e.is_empty()) {
                block.push_str(&format!("\n  Examples: {}", examples.join(", ")));
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
