//! Controller poll loop and builder

use super::{ControllerState, PollOutcome};
use crate::cluster::ClusterClient;
use crate::debounce::Debouncer;
use crate::error::ControllerError;
use crate::health::{components, ComponentHealth, HealthRegistry};
use crate::models::{ResourceRequirementSet, ScalingConfig};
use crate::observability::{ScalerMetrics, StructuredLogger};
use crate::reload::{ConfigReloader, Reload};
use crate::scaling::compute_requirements;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace};

/// Poll period used when the builder isn't given one
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(10);

/// Periodically resizes one workload in proportion to the cluster
pub struct Controller {
    cluster: Arc<dyn ClusterClient>,
    reloader: ConfigReloader,
    debouncer: Debouncer,
    poll_period: Duration,
    logger: StructuredLogger,
    metrics: Option<ScalerMetrics>,
    health: Option<HealthRegistry>,
    ready: Option<oneshot::Sender<()>>,
    state: ControllerState,
}

impl Controller {
    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn poll_period(&self) -> Duration {
        self.poll_period
    }

    /// The scaling configuration in effect, once one has been loaded
    pub fn current_config(&self) -> Option<&ScalingConfig> {
        self.reloader.current()
    }

    /// The last requirement set that was successfully applied
    pub fn last_applied(&self) -> Option<&ResourceRequirementSet> {
        self.debouncer.baseline()
    }

    /// Run until `shutdown` fires or its sender is dropped.
    ///
    /// Signals readiness, polls once straight away and then once per tick.
    /// A cycle in progress always completes; a pending tick loses to a
    /// pending stop.
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ControllerError> {
        match self.state {
            ControllerState::Stopped => return Err(ControllerError::AlreadyStopped),
            ControllerState::Running => return Err(ControllerError::AlreadyRunning),
            ControllerState::Idle => {}
        }
        self.state = ControllerState::Running;

        if let Some(health) = &self.health {
            for name in [components::CLUSTER, components::CONFIG, components::APPLY] {
                health.register(name).await;
            }
        }
        if let Some(ready) = self.ready.take() {
            // Nobody waiting is fine.
            let _ = ready.send(());
        }

        self.poll_once().await;
        if let Some(health) = &self.health {
            health.set_ready(true).await;
        }

        let mut ticker = interval_at(Instant::now() + self.poll_period, self.poll_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    break;
                }
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }

        self.state = ControllerState::Stopped;
        if let Some(health) = &self.health {
            health.set_ready(false).await;
        }
        self.logger.log_shutdown("stop signal received");
        Ok(())
    }

    /// Perform one poll cycle and record its outcome
    pub async fn poll_once(&mut self) -> PollOutcome {
        let start = std::time::Instant::now();
        let outcome = self.poll_cycle().await;

        if let Some(metrics) = &self.metrics {
            metrics.observe_poll(outcome.as_str(), start.elapsed().as_secs_f64());
        }
        debug!(
            workload = %self.logger.workload(),
            outcome = outcome.as_str(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Poll cycle complete"
        );
        outcome
    }

    async fn poll_cycle(&mut self) -> PollOutcome {
        let sample = match self.cluster.sample_cluster_size().await {
            Ok(sample) => sample,
            Err(e) => {
                self.logger.log_cluster_unavailable(&e);
                self.report(components::CLUSTER, ComponentHealth::degraded(e.to_string()))
                    .await;
                return PollOutcome::ClusterUnavailable;
            }
        };
        debug!(
            workload = %self.logger.workload(),
            nodes = sample.nodes,
            cores = sample.cores,
            "Sampled cluster size"
        );
        if let Some(metrics) = &self.metrics {
            metrics.set_cluster_size(&sample);
        }
        self.report(components::CLUSTER, ComponentHealth::healthy()).await;

        match self.reloader.refresh().await {
            Ok(Reload::Loaded) => {
                let containers = self.reloader.current().map_or(0, |c| c.len());
                let source = self.reloader.source_name();
                self.logger.log_config_loaded(source.as_deref(), containers);
                if let Some(metrics) = &self.metrics {
                    metrics.inc_config_reload(true);
                }
                self.report(components::CONFIG, ComponentHealth::healthy()).await;
            }
            Ok(Reload::Unchanged) => {}
            Err(e) => {
                let have_previous = self.reloader.current().is_some();
                self.logger.log_config_failed(&e, have_previous);
                if let Some(metrics) = &self.metrics {
                    metrics.inc_config_reload(false);
                }
                let health = if have_previous {
                    ComponentHealth::degraded(e.to_string())
                } else {
                    ComponentHealth::unhealthy(e.to_string())
                };
                self.report(components::CONFIG, health).await;
                return PollOutcome::ConfigUnavailable;
            }
        }

        let Some(config) = self.reloader.current() else {
            return PollOutcome::ConfigUnavailable;
        };
        let computation = compute_requirements(config, &sample);

        if !computation.failures.is_empty() {
            for failure in &computation.failures {
                self.logger.log_computation_failure(failure);
            }
            if let Some(metrics) = &self.metrics {
                metrics.inc_computation_failures(computation.failures.len());
            }
        }

        let requirements = computation.requirements;
        if !self.debouncer.needs_apply(&requirements) {
            trace!(
                workload = %self.logger.workload(),
                "Resource requirements unchanged, skipping update"
            );
            return PollOutcome::Unchanged;
        }

        self.logger.log_update(&sample, &requirements);
        match self.cluster.apply(&requirements).await {
            Ok(()) => {
                self.logger.log_apply_result(None);
                if let Some(metrics) = &self.metrics {
                    metrics.inc_apply(true);
                    metrics.set_targets(&requirements);
                }
                self.report(components::APPLY, ComponentHealth::healthy()).await;
                self.debouncer.record_applied(requirements);
                PollOutcome::Applied
            }
            Err(e) => {
                self.logger.log_apply_result(Some(&e));
                if let Some(metrics) = &self.metrics {
                    metrics.inc_apply(false);
                }
                self.report(components::APPLY, ComponentHealth::degraded(e.to_string()))
                    .await;
                PollOutcome::ApplyFailed
            }
        }
    }

    async fn report(&self, component: &str, health: ComponentHealth) {
        if let Some(registry) = &self.health {
            registry.update(component, health).await;
        }
    }
}

/// Builder for a [`Controller`]
pub struct ControllerBuilder {
    cluster: Option<Arc<dyn ClusterClient>>,
    reloader: Option<ConfigReloader>,
    poll_period: Duration,
    logger: Option<StructuredLogger>,
    metrics: Option<ScalerMetrics>,
    health: Option<HealthRegistry>,
    ready: Option<oneshot::Sender<()>>,
}

impl ControllerBuilder {
    pub fn new() -> Self {
        Self {
            cluster: None,
            reloader: None,
            poll_period: DEFAULT_POLL_PERIOD,
            logger: None,
            metrics: None,
            health: None,
            ready: None,
        }
    }

    pub fn cluster(mut self, cluster: Arc<dyn ClusterClient>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    pub fn reloader(mut self, reloader: ConfigReloader) -> Self {
        self.reloader = Some(reloader);
        self
    }

    pub fn poll_period(mut self, period: Duration) -> Self {
        self.poll_period = period;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn metrics(mut self, metrics: ScalerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Fired once when the controller starts running
    pub fn ready(mut self, ready: oneshot::Sender<()>) -> Self {
        self.ready = Some(ready);
        self
    }

    pub fn build(self) -> Result<Controller, ControllerError> {
        let cluster = self.cluster.ok_or(ControllerError::Missing("cluster client"))?;
        let reloader = self.reloader.ok_or(ControllerError::Missing("config reloader"))?;
        if self.poll_period.is_zero() {
            return Err(ControllerError::ZeroPollPeriod);
        }

        Ok(Controller {
            cluster,
            reloader,
            debouncer: Debouncer::new(),
            poll_period: self.poll_period,
            logger: self
                .logger
                .unwrap_or_else(|| StructuredLogger::new("unknown")),
            metrics: self.metrics,
            health: self.health,
            ready: self.ready,
            state: ControllerState::Idle,
        })
    }
}

impl Default for ControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
