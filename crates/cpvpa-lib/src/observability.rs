//! Observability infrastructure for the autoscaler
//!
//! Provides:
//! - Prometheus metrics (poll outcomes, apply results, cluster size, targets)
//! - Structured logging of controller events with tracing

use crate::models::{ClusterSample, RequirementClass, ResourceRequirementSet};
use crate::scaling::ResourceFailure;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use tracing::{error, info, warn};

/// Histogram buckets for poll cycle duration (in seconds)
const POLL_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Autoscaler metrics for Prometheus exposition
///
/// Each handle owns its registry; clones share the same underlying metrics.
#[derive(Clone)]
pub struct ScalerMetrics {
    registry: Registry,
    poll_cycles: IntCounterVec,
    poll_duration_seconds: Histogram,
    applies: IntCounterVec,
    config_reloads: IntCounterVec,
    computation_failures: IntCounter,
    cluster_nodes: IntGauge,
    cluster_cores: IntGauge,
    target_milli: IntGaugeVec,
}

impl ScalerMetrics {
    /// Create the metrics and register them in a fresh registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let poll_cycles = IntCounterVec::new(
            Opts::new("cpvpa_poll_cycles_total", "Poll cycles by outcome"),
            &["outcome"],
        )?;
        let poll_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "cpvpa_poll_duration_seconds",
                "Time spent in one poll cycle",
            )
            .buckets(POLL_BUCKETS.to_vec()),
        )?;
        let applies = IntCounterVec::new(
            Opts::new("cpvpa_applies_total", "Attempts to update the target by result"),
            &["result"],
        )?;
        let config_reloads = IntCounterVec::new(
            Opts::new(
                "cpvpa_config_reloads_total",
                "Config source reads by result",
            ),
            &["result"],
        )?;
        let computation_failures = IntCounter::new(
            "cpvpa_computation_failures_total",
            "Resources whose target could not be computed",
        )?;
        let cluster_nodes = IntGauge::new("cpvpa_cluster_nodes", "Nodes in the last sample")?;
        let cluster_cores = IntGauge::new("cpvpa_cluster_cores", "Cores in the last sample")?;
        let target_milli = IntGaugeVec::new(
            Opts::new(
                "cpvpa_target_milli",
                "Last applied requirement in milli-units",
            ),
            &["container", "class", "resource"],
        )?;

        registry.register(Box::new(poll_cycles.clone()))?;
        registry.register(Box::new(poll_duration_seconds.clone()))?;
        registry.register(Box::new(applies.clone()))?;
        registry.register(Box::new(config_reloads.clone()))?;
        registry.register(Box::new(computation_failures.clone()))?;
        registry.register(Box::new(cluster_nodes.clone()))?;
        registry.register(Box::new(cluster_cores.clone()))?;
        registry.register(Box::new(target_milli.clone()))?;

        Ok(Self {
            registry,
            poll_cycles,
            poll_duration_seconds,
            applies,
            config_reloads,
            computation_failures,
            cluster_nodes,
            cluster_cores,
            target_milli,
        })
    }

    /// Record a finished poll cycle
    pub fn observe_poll(&self, outcome: &str, duration_secs: f64) {
        self.poll_cycles.with_label_values(&[outcome]).inc();
        self.poll_duration_seconds.observe(duration_secs);
    }

    pub fn set_cluster_size(&self, sample: &ClusterSample) {
        self.cluster_nodes.set(sample.nodes as i64);
        self.cluster_cores.set(sample.cores as i64);
    }

    pub fn inc_config_reload(&self, success: bool) {
        let result = if success { "loaded" } else { "failed" };
        self.config_reloads.with_label_values(&[result]).inc();
    }

    pub fn inc_computation_failures(&self, count: usize) {
        self.computation_failures.inc_by(count as u64);
    }

    pub fn inc_apply(&self, success: bool) {
        let result = if success { "success" } else { "failure" };
        self.applies.with_label_values(&[result]).inc();
    }

    /// Replace the per-resource target gauges with `applied`
    pub fn set_targets(&self, applied: &ResourceRequirementSet) {
        self.target_milli.reset();
        for (container, reqs) in applied {
            for class in RequirementClass::ALL {
                for (resource, quantity) in reqs.class(class) {
                    if let Ok(milli) = quantity.milli_value() {
                        let labels = [container.as_str(), class.as_str(), resource.as_str()];
                        self.target_milli.with_label_values(&labels).set(milli);
                    }
                }
            }
        }
    }

    /// Gather every metric family in this registry
    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// Render the text exposition format
    pub fn encode_text(&self) -> prometheus::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buffer)?;
        Ok(buffer)
    }
}

/// Structured logger for controller events
///
/// Every event carries the workload being scaled so that several
/// autoscalers can share one log stream.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    workload: String,
}

impl StructuredLogger {
    pub fn new(workload: impl Into<String>) -> Self {
        Self {
            workload: workload.into(),
        }
    }

    pub fn workload(&self) -> &str {
        &self.workload
    }

    /// Log controller startup
    pub fn log_startup(&self, version: &str, poll_period_secs: u64, config_source: Option<&str>) {
        info!(
            event = "controller_started",
            workload = %self.workload,
            version = %version,
            poll_period_secs,
            config_source = config_source.unwrap_or("<default only>"),
            "Autoscaler started"
        );
    }

    /// Log controller shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "controller_stopped",
            workload = %self.workload,
            reason = %reason,
            "Autoscaler stopped"
        );
    }

    pub fn log_cluster_unavailable(&self, error: &dyn std::error::Error) {
        warn!(
            event = "cluster_sample_failed",
            workload = %self.workload,
            error = %error,
            "Failed to sample cluster size, skipping cycle"
        );
    }

    pub fn log_config_loaded(&self, source: Option<&str>, containers: usize) {
        info!(
            event = "config_loaded",
            workload = %self.workload,
            source = source.unwrap_or("<default only>"),
            containers,
            "Loaded scaling config"
        );
    }

    pub fn log_config_failed(&self, error: &dyn std::error::Error, have_previous: bool) {
        if have_previous {
            warn!(
                event = "config_load_failed",
                workload = %self.workload,
                error = %error,
                "Failed to reload scaling config, keeping previous config"
            );
        } else {
            error!(
                event = "config_load_failed",
                workload = %self.workload,
                error = %error,
                "Failed to load scaling config, skipping cycle"
            );
        }
    }

    pub fn log_computation_failure(&self, failure: &ResourceFailure) {
        warn!(
            event = "computation_failed",
            workload = %self.workload,
            container = %failure.container,
            class = %failure.class,
            resource = %failure.resource,
            error = %failure.error,
            "Failed to compute resource target, leaving it out"
        );
    }

    /// Log an update about to be made, with the sample that produced it
    pub fn log_update(&self, sample: &ClusterSample, requirements: &ResourceRequirementSet) {
        info!(
            event = "update_requested",
            workload = %self.workload,
            nodes = sample.nodes,
            cores = sample.cores,
            requirements = %requirements,
            "Updating resource requirements"
        );
    }

    pub fn log_apply_result(&self, error: Option<&dyn std::error::Error>) {
        match error {
            None => info!(
                event = "update_applied",
                workload = %self.workload,
                "Resource requirements applied"
            ),
            Some(error) => error!(
                event = "update_failed",
                workload = %self.workload,
                error = %error,
                "Failed to apply resource requirements, will retry next cycle"
            ),
        }
    }
}
