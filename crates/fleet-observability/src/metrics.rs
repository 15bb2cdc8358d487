//! Prometheus metrics for the registry, mirror and router
//!
//! Every metric lives in a registry owned by [`FleetMetrics`] rather than the
//! process-global default, so tests and multiple services in one process do
//! not collide. Label values come from closed enums to bound cardinality.

use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::time::Duration;
use thiserror::Error;

use crate::LATENCY_BUCKETS;

/// Semantic mirror operation, used as the `op` label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorOp {
    CreateCollection,
    Upsert,
    Remove,
    Sync,
}

impl MirrorOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            MirrorOp::CreateCollection => "create_collection",
            MirrorOp::Upsert => "upsert",
            MirrorOp::Remove => "remove",
            MirrorOp::Sync => "sync",
        }
    }
}

/// How a routed request ended, used as the `outcome` label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingOutcome {
    /// Relayed from the selected agent
    Dispatched,
    /// Candidate retrieval returned nothing usable
    NoCandidates,
    /// Planner picked no agent or an unknown one
    NoMatch,
    /// Selected agent failed mid-stream
    UpstreamError,
    /// Candidate retrieval failed
    IndexError,
    /// Caller went away mid-relay
    Cancelled,
}

impl RoutingOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingOutcome::Dispatched => "dispatched",
            RoutingOutcome::NoCandidates => "no_candidates",
            RoutingOutcome::NoMatch => "no_match",
            RoutingOutcome::UpstreamError => "upstream_error",
            RoutingOutcome::IndexError => "index_error",
            RoutingOutcome::Cancelled => "cancelled",
        }
    }
}

/// Fleet metric set
#[derive(Debug, Clone)]
pub struct FleetMetrics {
    registry: Registry,
    live_agents: IntGauge,
    reaped_agents_total: IntCounter,
    change_events_total: IntCounterVec,
    watch_reconnects_total: IntCounter,
    mirror_failures_total: IntCounterVec,
    routing_requests_total: IntCounterVec,
    routing_duration_seconds: Histogram,
}

impl FleetMetrics {
    /// Create and register every metric in a fresh registry
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let live_agents = IntGauge::with_opts(Opts::new(
            "fleet_live_agents",
            "Number of descriptors in the registry replica",
        ))?;
        let reaped_agents_total = IntCounter::with_opts(Opts::new(
            "fleet_reaped_agents_total",
            "Agents evicted by the reaper",
        ))?;
        let change_events_total = IntCounterVec::new(
            Opts::new(
                "fleet_change_events_total",
                "Change events delivered to watch handlers by kind",
            ),
            &["kind"],
        )?;
        let watch_reconnects_total = IntCounter::with_opts(Opts::new(
            "fleet_watch_reconnects_total",
            "Keyspace subscription rebuilds after a lost connection",
        ))?;
        let mirror_failures_total = IntCounterVec::new(
            Opts::new(
                "fleet_mirror_failures_total",
                "Failed semantic mirror operations by op",
            ),
            &["op"],
        )?;
        let routing_requests_total = IntCounterVec::new(
            Opts::new(
                "fleet_routing_requests_total",
                "Routed requests by outcome",
            ),
            &["outcome"],
        )?;
        let routing_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "fleet_routing_duration_seconds",
                "End-to-end routing duration in seconds",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
        )?;

        registry.register(Box::new(live_agents.clone()))?;
        registry.register(Box::new(reaped_agents_total.clone()))?;
        registry.register(Box::new(change_events_total.clone()))?;
        registry.register(Box::new(watch_reconnects_total.clone()))?;
        registry.register(Box::new(mirror_failures_total.clone()))?;
        registry.register(Box::new(routing_requests_total.clone()))?;
        registry.register(Box::new(routing_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            live_agents,
            reaped_agents_total,
            change_events_total,
            watch_reconnects_total,
            mirror_failures_total,
            routing_requests_total,
            routing_duration_seconds,
        })
    }

    pub fn set_live_agents(&self, count: usize) {
        self.live_agents
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    pub fn record_reaped(&self, count: usize) {
        self.reaped_agents_total
            .inc_by(u64::try_from(count).unwrap_or(u64::MAX));
    }

    /// `kind` is `add` or `remove`
    pub fn record_change(&self, kind: &str) {
        self.change_events_total.with_label_values(&[kind]).inc();
    }

    pub fn record_reconnect(&self) {
        self.watch_reconnects_total.inc();
    }

    pub fn record_mirror_failure(&self, op: MirrorOp) {
        self.mirror_failures_total
            .with_label_values(&[op.as_str()])
            .inc();
    }

    pub fn record_routing(&self, outcome: RoutingOutcome, elapsed: Duration) {
        self.routing_requests_total
            .with_label_values(&[outcome.as_str()])
            .inc();
        self.routing_duration_seconds.observe(elapsed.as_secs_f64());
    }

    pub fn live_agents(&self) -> i64 {
        self.live_agents.get()
    }

    pub fn reaped_total(&self) -> u64 {
        self.reaped_agents_total.get()
    }

    pub fn change_total(&self, kind: &str) -> u64 {
        self.change_events_total.with_label_values(&[kind]).get()
    }

    pub fn prometheus_registry(&self) -> &Registry {
        &self.registry
    }

    /// Render every metric in the Prometheus text exposition format
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        Ok(encoder.encode_to_string(&families)?)
    }
}

/// Metrics errors
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registries_are_independent() {
        let first = FleetMetrics::new().unwrap();
        let second = FleetMetrics::new().unwrap();

        first.set_live_agents(3);
        assert_eq!(first.live_agents(), 3);
        assert_eq!(second.live_agents(), 0);
    }

    #[test]
    fn test_counters() {
        let metrics = FleetMetrics::new().unwrap();
        metrics.record_reaped(2);
        metrics.record_reaped(0);
        metrics.record_change("add");
        metrics.record_change("add");
        metrics.record_change("remove");

        assert_eq!(metrics.reaped_total(), 2);
        assert_eq!(metrics.change_total("add"), 2);
        assert_eq!(metrics.change_total("remove"), 1);
    }

    #[test]
    fn test_encode_text_format() {
        let metrics = FleetMetrics::new().unwrap();
        metrics.set_live_agents(1);
        metrics.record_reconnect();
        metrics.record_mirror_failure(MirrorOp::Upsert);
        metrics.record_routing(RoutingOutcome::NoMatch, Duration::from_millis(40));

        let text = metrics.encode().unwrap();
        assert!(text.contains("fleet_live_agents 1"));
        assert!(text.contains("fleet_watch_reconnects_total 1"));
        assert!(text.contains("fleet_mirror_failures_total{op=\"upsert\"} 1"));
        assert!(text.contains("fleet_routing_requests_total{outcome=\"no_match\"} 1"));
        assert!(text.contains("fleet_routing_duration_seconds_count 1"));
    }
}
