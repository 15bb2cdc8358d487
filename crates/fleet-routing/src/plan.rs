//! Planner answers and how they are salvaged
//!
//! Models asked for a bare JSON object still wrap it in markdown fences or
//! answer with single-quoted keys. [`decode_plan`] tries, in order: the raw
//! text, the text with code fences stripped, and the stripped text with
//! single quotes turned into double quotes. Anything else is an empty plan.

use fleet_a2a::AgentCard;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// The planner's decision for one query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingPlan {
    pub original_query: String,
    /// Name of the chosen candidate, empty when none fits
    pub agent: String,
}

impl RoutingPlan {
    /// A plan that selects nothing
    pub fn no_match(query: impl Into<String>) -> Self {
        Self {
            original_query: query.into(),
            agent: String::new(),
        }
    }

    pub fn is_match(&self) -> bool {
        !self.agent.is_empty()
    }

    /// First candidate whose name is exactly the planned agent
    pub fn select<'a>(&self, candidates: &'a [AgentCard]) -> Option<&'a AgentCard> {
        if !self.is_match() {
            return None;
        }
        candidates.iter().find(|card| card.name == self.agent)
    }
}

/// Decode a planner answer; never fails
///
/// `query` fills `original_query` when the answer leaves it out.
pub fn decode_plan(answer: &str, query: &str) -> RoutingPlan {
    let stripped = strip_fences(answer);
    let attempts = [
        answer.to_string(),
        stripped.to_string(),
        stripped.replace('\'', "\""),
    ];
    for attempt in &attempts {
        if let Ok(value) = serde_json::from_str::<Value>(attempt) {
            return plan_from_value(&value, query);
        }
    }
    debug!(answer = %answer, "Planner answer is not JSON");
    RoutingPlan::no_match(query)
}

fn plan_from_value(value: &Value, query: &str) -> RoutingPlan {
    let Some(object) = value.as_object() else {
        return RoutingPlan::no_match(query);
    };
    let field = |key: &str| object.get(key).and_then(Value::as_str);
    RoutingPlan {
        original_query: field("original_query").unwrap_or(query).to_string(),
        agent: field("agent").unwrap_or_default().to_string(),
    }
}

/// Peel markdown code fences off both ends until none are left
fn strip_fences(text: &str) -> &str {
    let mut current = text.trim();
    loop {
        let mut next = current;
        if let Some(rest) = next.strip_prefix("```json") {
            next = rest;
        } else if let Some(rest) = next.strip_prefix("```") {
            next = rest;
        }
        if let Some(rest) = next.strip_suffix("```") {
            next = rest;
        }
        let next = next.trim();
        if next.len() == current.len() {
            return current;
        }
        current = next;
    }
}
