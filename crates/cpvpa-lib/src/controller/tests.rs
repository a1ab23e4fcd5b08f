//! Controller tests against an in-memory cluster
//!
//! Loop timing tests run on a paused clock, so ticks are driven by the
//! test's own sleeps rather than wall time.

use super::*;
use crate::cluster::{ClusterClient, KubeClusterClient, TargetSpec};
use crate::error::{ClusterError, ConfigError, ControllerError};
use crate::health::{components, ComponentStatus, HealthRegistry};
use crate::models::{ClusterSample, RequirementClass, ResourceRequirementSet, ScalingConfig};
use crate::quantity::Quantity;
use crate::reload::{ConfigReloader, ConfigSource};
use async_trait::async_trait;
use http::{Method, Request, Response};
use hyper::Body;
use kube::Client;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};
use tower_test::mock;

const PERIOD: Duration = Duration::from_secs(10);

/// Cluster whose size and failures are set by the test
#[derive(Default)]
struct MockCluster {
    sample: Mutex<ClusterSample>,
    samples: AtomicUsize,
    fail_sample: AtomicBool,
    fail_apply: AtomicBool,
    apply_attempts: AtomicUsize,
    applied: Mutex<Vec<ResourceRequirementSet>>,
    slow_sample: Mutex<Option<Duration>>,
}

impl MockCluster {
    fn new(nodes: u64, cores: u64) -> Arc<Self> {
        let cluster = Self::default();
        *cluster.sample.lock().unwrap() = ClusterSample::new(nodes, cores);
        Arc::new(cluster)
    }

    fn resize(&self, nodes: u64, cores: u64) {
        *self.sample.lock().unwrap() = ClusterSample::new(nodes, cores);
    }

    fn samples(&self) -> usize {
        self.samples.load(Ordering::SeqCst)
    }

    fn apply_attempts(&self) -> usize {
        self.apply_attempts.load(Ordering::SeqCst)
    }

    fn applied(&self) -> Vec<ResourceRequirementSet> {
        self.applied.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClusterClient for MockCluster {
    async fn sample_cluster_size(&self) -> Result<ClusterSample, ClusterError> {
        self.samples.fetch_add(1, Ordering::SeqCst);
        let delay = self.slow_sample.lock().unwrap().take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_sample.load(Ordering::SeqCst) {
            return Err(ClusterError::Query("connection refused".to_string()));
        }
        Ok(*self.sample.lock().unwrap())
    }

    async fn apply(&self, requirements: &ResourceRequirementSet) -> Result<(), ClusterError> {
        self.apply_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_apply.load(Ordering::SeqCst) {
            return Err(ClusterError::Apply("forbidden".to_string()));
        }
        self.applied.lock().unwrap().push(requirements.clone());
        Ok(())
    }
}

/// Config source whose contents and failures are set by the test
struct SharedSource {
    contents: Arc<Mutex<Result<String, String>>>,
    version: Arc<AtomicUsize>,
    loaded: usize,
    pending: usize,
}

impl SharedSource {
    fn new(contents: &str) -> (Self, Arc<Mutex<Result<String, String>>>, Arc<AtomicUsize>) {
        let contents = Arc::new(Mutex::new(Ok(contents.to_string())));
        let version = Arc::new(AtomicUsize::new(1));
        let source = Self {
            contents: contents.clone(),
            version: version.clone(),
            loaded: 0,
            pending: 0,
        };
        (source, contents, version)
    }
}

#[async_trait]
impl ConfigSource for SharedSource {
    fn describe(&self) -> String {
        "shared".to_string()
    }

    async fn has_changed(&self) -> Result<bool, ConfigError> {
        Ok(self.version.load(Ordering::SeqCst) != self.loaded)
    }

    async fn read(&mut self) -> Result<Vec<u8>, ConfigError> {
        self.pending = self.version.load(Ordering::SeqCst);
        match &*self.contents.lock().unwrap() {
            Ok(contents) => Ok(contents.as_bytes().to_vec()),
            Err(message) => Err(ConfigError::Source {
                source_name: self.describe(),
                message: message.clone(),
                cause: None,
            }),
        }
    }

    fn mark_loaded(&mut self) {
        self.loaded = self.pending;
    }
}

const CONFIG: &str = r#"{
  "app": {
    "requests": { "cpu": { "base": "100m", "step": "10m", "coresPerStep": 1 } },
    "limits": { "memory": { "base": "64Mi", "step": "16Mi", "nodesPerStep": 2 } }
  }
}"#;

fn config() -> ScalingConfig {
    ScalingConfig::from_json(CONFIG.as_bytes()).unwrap()
}

fn controller(cluster: Arc<MockCluster>) -> Controller {
    ControllerBuilder::new()
        .cluster(cluster)
        .reloader(ConfigReloader::new(config()))
        .poll_period(PERIOD)
        .build()
        .unwrap()
}

fn request(set: &ResourceRequirementSet, container: &str, resource: &str) -> Option<Quantity> {
    set.get(container)?
        .class(RequirementClass::Requests)
        .get(resource)
        .copied()
}

#[tokio::test]
async fn test_first_poll_applies_computed_targets() {
    let cluster = MockCluster::new(3, 4);
    let mut controller = controller(cluster.clone());

    assert_eq!(controller.poll_once().await, PollOutcome::Applied);

    let applied = cluster.applied();
    assert_eq!(applied.len(), 1);
    assert_eq!(
        request(&applied[0], "app", "cpu"),
        Some(Quantity::parse("140m").unwrap())
    );
    // 3 nodes at 2 per step is 2 steps.
    assert_eq!(
        applied[0].get("app").unwrap().limits["memory"],
        Quantity::parse("96Mi").unwrap()
    );
    assert_eq!(controller.last_applied(), Some(&applied[0]));
}

#[tokio::test]
async fn test_unchanged_cluster_applies_once() {
    let cluster = MockCluster::new(3, 4);
    let mut controller = controller(cluster.clone());

    assert_eq!(controller.poll_once().await, PollOutcome::Applied);
    assert_eq!(controller.poll_once().await, PollOutcome::Unchanged);
    assert_eq!(controller.poll_once().await, PollOutcome::Unchanged);
    assert_eq!(cluster.apply_attempts(), 1);
}

#[tokio::test]
async fn test_grown_cluster_is_reapplied() {
    let cluster = MockCluster::new(3, 4);
    let mut controller = controller(cluster.clone());
    controller.poll_once().await;

    cluster.resize(3, 8);
    assert_eq!(controller.poll_once().await, PollOutcome::Applied);
    assert_eq!(
        request(&cluster.applied()[1], "app", "cpu"),
        Some(Quantity::parse("180m").unwrap())
    );

    // Still within the same node step, so only cpu moved.
    cluster.resize(4, 8);
    assert_eq!(controller.poll_once().await, PollOutcome::Unchanged);
}

#[tokio::test]
async fn test_failed_apply_is_retried_next_cycle() {
    let cluster = MockCluster::new(3, 4);
    let mut controller = controller(cluster.clone());

    cluster.fail_apply.store(true, Ordering::SeqCst);
    assert_eq!(controller.poll_once().await, PollOutcome::ApplyFailed);
    assert!(controller.last_applied().is_none());

    cluster.fail_apply.store(false, Ordering::SeqCst);
    assert_eq!(controller.poll_once().await, PollOutcome::Applied);
    assert_eq!(cluster.apply_attempts(), 2);
    assert_eq!(cluster.applied().len(), 1);
}

#[tokio::test]
async fn test_cluster_failure_skips_cycle() {
    let cluster = MockCluster::new(3, 4);
    let mut controller = controller(cluster.clone());

    cluster.fail_sample.store(true, Ordering::SeqCst);
    assert_eq!(controller.poll_once().await, PollOutcome::ClusterUnavailable);
    assert_eq!(cluster.apply_attempts(), 0);
    // The config isn't even consulted.
    assert!(controller.current_config().is_none());

    cluster.fail_sample.store(false, Ordering::SeqCst);
    assert_eq!(controller.poll_once().await, PollOutcome::Applied);
}

#[tokio::test]
async fn test_config_failure_keeps_previous_config() {
    let cluster = MockCluster::new(3, 4);
    let (source, contents, version) =
        SharedSource::new(r#"{"app": {"requests": {"cpu": {"base": "1"}}}}"#);
    let mut controller = ControllerBuilder::new()
        .cluster(cluster.clone())
        .reloader(ConfigReloader::with_source(config(), Box::new(source)))
        .build()
        .unwrap();

    assert_eq!(controller.poll_once().await, PollOutcome::Applied);
    let loaded = controller.current_config().cloned();

    *contents.lock().unwrap() = Err("permission denied".to_string());
    version.fetch_add(1, Ordering::SeqCst);

    for _ in 0..2 {
        assert_eq!(controller.poll_once().await, PollOutcome::ConfigUnavailable);
        assert_eq!(controller.current_config().cloned(), loaded);
    }
    assert_eq!(cluster.apply_attempts(), 1);

    *contents.lock().unwrap() = Ok(r#"{"app": {"requests": {"cpu": {"base": "2"}}}}"#.to_string());
    assert_eq!(controller.poll_once().await, PollOutcome::Applied);
    assert_eq!(
        request(&cluster.applied()[1], "app", "cpu"),
        Some(Quantity::parse("2").unwrap())
    );
}

#[tokio::test]
async fn test_overflowing_resource_is_left_out() {
    let cluster = MockCluster::new(1, 4);
    let overflowing = r#"{
      "app": {
        "requests": {
          "cpu": { "base": "9223372036854775807m", "step": "1", "coresPerStep": 1 },
          "memory": { "base": "64Mi" }
        }
      }
    }"#;
    let mut controller = ControllerBuilder::new()
        .cluster(cluster.clone())
        .reloader(ConfigReloader::new(
            ScalingConfig::from_json(overflowing.as_bytes()).unwrap(),
        ))
        .build()
        .unwrap();

    assert_eq!(controller.poll_once().await, PollOutcome::Applied);
    let applied = &cluster.applied()[0];
    assert_eq!(request(applied, "app", "cpu"), None);
    assert_eq!(
        request(applied, "app", "memory"),
        Some(Quantity::parse("64Mi").unwrap())
    );
}

#[tokio::test]
async fn test_health_follows_poll_outcomes() {
    let cluster = MockCluster::new(3, 4);
    let health = HealthRegistry::new();
    let mut controller = ControllerBuilder::new()
        .cluster(cluster.clone())
        .reloader(ConfigReloader::new(config()))
        .health(health.clone())
        .build()
        .unwrap();

    cluster.fail_apply.store(true, Ordering::SeqCst);
    controller.poll_once().await;
    let report = health.health().await;
    assert_eq!(report.status, ComponentStatus::Degraded);
    assert_eq!(
        report.components[components::APPLY].status,
        ComponentStatus::Degraded
    );

    cluster.fail_apply.store(false, Ordering::SeqCst);
    controller.poll_once().await;
    assert_eq!(health.health().await.status, ComponentStatus::Healthy);
}

#[tokio::test]
async fn test_dry_run_apply_moves_baseline() {
    let (service, mut handle) = mock::pair::<Request<Body>, Response<Body>>();
    let api_server = tokio::spawn(async move {
        let mut node_lists = 0;
        while let Some((request, send)) = handle.next_request().await {
            assert_eq!(request.method(), Method::GET, "dry run must not write");
            assert_eq!(request.uri().path(), "/api/v1/nodes");
            node_lists += 1;
            let nodes = serde_json::json!({
                "apiVersion": "v1",
                "kind": "NodeList",
                "metadata": {},
                "items": [
                    { "metadata": { "name": "node-a" }, "status": { "capacity": { "cpu": "2" } } },
                    { "metadata": { "name": "node-b" }, "status": { "capacity": { "cpu": "2" } } }
                ]
            });
            send.send_response(
                Response::builder()
                    .body(Body::from(serde_json::to_vec(&nodes).unwrap()))
                    .unwrap(),
            );
        }
        node_lists
    });

    let target = TargetSpec::parse("deployment/app", "default").unwrap();
    let cluster = KubeClusterClient::from_client(Client::new(service, "default"), target, true);
    let mut controller = ControllerBuilder::new()
        .cluster(Arc::new(cluster))
        .reloader(ConfigReloader::new(config()))
        .build()
        .unwrap();

    assert_eq!(controller.poll_once().await, PollOutcome::Applied);
    assert_eq!(
        request(controller.last_applied().unwrap(), "app", "cpu"),
        Some(Quantity::parse("140m").unwrap())
    );
    assert_eq!(controller.poll_once().await, PollOutcome::Unchanged);

    drop(controller);
    assert_eq!(api_server.await.unwrap(), 2);
}

#[test]
fn test_builder_requires_cluster_and_reloader() {
    let missing_cluster = ControllerBuilder::new()
        .reloader(ConfigReloader::new(config()))
        .build();
    assert!(matches!(missing_cluster, Err(ControllerError::Missing(_))));

    let missing_reloader = ControllerBuilder::new()
        .cluster(MockCluster::new(1, 1))
        .build();
    assert!(matches!(missing_reloader, Err(ControllerError::Missing(_))));

    let zero_period = ControllerBuilder::new()
        .cluster(MockCluster::new(1, 1))
        .reloader(ConfigReloader::new(config()))
        .poll_period(Duration::ZERO)
        .build();
    assert!(matches!(zero_period, Err(ControllerError::ZeroPollPeriod)));
}

#[test]
fn test_builder_defaults() {
    let controller = ControllerBuilder::new()
        .cluster(MockCluster::new(1, 1))
        .reloader(ConfigReloader::new(config()))
        .build()
        .unwrap();
    assert_eq!(controller.poll_period(), DEFAULT_POLL_PERIOD);
    assert_eq!(controller.state(), ControllerState::Idle);
}

/// Start `controller` on its own task and wait until it reports ready
async fn spawn(
    mut controller: Controller,
) -> (
    broadcast::Sender<()>,
    tokio::task::JoinHandle<(Controller, Result<(), ControllerError>)>,
) {
    let (stop_tx, stop_rx) = broadcast::channel(1);
    let handle = tokio::spawn(async move {
        let result = controller.run(stop_rx).await;
        (controller, result)
    });
    (stop_tx, handle)
}

fn ready_controller(cluster: Arc<MockCluster>) -> (Controller, oneshot::Receiver<()>) {
    let (ready_tx, ready_rx) = oneshot::channel();
    let controller = ControllerBuilder::new()
        .cluster(cluster)
        .reloader(ConfigReloader::new(config()))
        .poll_period(PERIOD)
        .ready(ready_tx)
        .build()
        .unwrap();
    (controller, ready_rx)
}

#[tokio::test(start_paused = true)]
async fn test_run_polls_at_start_then_each_tick() {
    let cluster = MockCluster::new(3, 4);
    let (controller, ready) = ready_controller(cluster.clone());
    let start = Instant::now();
    let (stop, handle) = spawn(controller).await;

    ready.await.unwrap();
    tokio::time::sleep_until(start + Duration::from_secs(1)).await;
    assert_eq!(cluster.samples(), 1);
    assert_eq!(cluster.apply_attempts(), 1);

    tokio::time::sleep_until(start + PERIOD + Duration::from_secs(1)).await;
    assert_eq!(cluster.samples(), 2);

    tokio::time::sleep_until(start + PERIOD * 3 + Duration::from_secs(1)).await;
    assert_eq!(cluster.samples(), 4);
    // Nothing changed after the first cycle.
    assert_eq!(cluster.apply_attempts(), 1);

    stop.send(()).unwrap();
    let (controller, result) = handle.await.unwrap();
    assert!(result.is_ok());
    assert_eq!(controller.state(), ControllerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_stop_wins_over_pending_tick() {
    let cluster = MockCluster::new(3, 4);
    let (controller, ready) = ready_controller(cluster.clone());
    let (stop, handle) = spawn(controller).await;

    // Stop is already pending when the loop first waits.
    stop.send(()).unwrap();
    ready.await.unwrap();

    let (_, result) = handle.await.unwrap();
    assert!(result.is_ok());

    tokio::time::sleep(PERIOD * 5).await;
    assert_eq!(cluster.samples(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_sender_stops_controller() {
    let cluster = MockCluster::new(3, 4);
    let (controller, ready) = ready_controller(cluster.clone());
    let (stop, handle) = spawn(controller).await;
    ready.await.unwrap();

    drop(stop);
    let (controller, result) = handle.await.unwrap();
    assert!(result.is_ok());
    assert_eq!(controller.state(), ControllerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_slow_cycle_skips_missed_ticks() {
    let cluster = MockCluster::new(3, 4);
    let (controller, ready) = ready_controller(cluster.clone());
    let start = Instant::now();
    let (stop, handle) = spawn(controller).await;
    ready.await.unwrap();

    tokio::time::sleep_until(start + Duration::from_secs(1)).await;
    assert_eq!(cluster.samples(), 1);

    // The tick at 10s starts a cycle that runs until 35s, missing 20s and 30s.
    *cluster.slow_sample.lock().unwrap() = Some(Duration::from_secs(25));

    tokio::time::sleep_until(start + Duration::from_secs(39)).await;
    assert_eq!(cluster.samples(), 2);

    tokio::time::sleep_until(start + Duration::from_secs(41)).await;
    assert_eq!(cluster.samples(), 3);

    stop.send(()).unwrap();
    handle.await.unwrap().1.unwrap();
}

#[tokio::test]
async fn test_run_after_stop_is_rejected() {
    let cluster = MockCluster::new(3, 4);
    let mut controller = controller(cluster.clone());

    let (stop, stop_rx) = broadcast::channel(1);
    stop.send(()).unwrap();
    assert_ok!(controller.run(stop_rx).await);
    assert_eq!(controller.state(), ControllerState::Stopped);

    let err = assert_err!(controller.run(stop.subscribe()).await);
    assert!(matches!(err, ControllerError::AlreadyStopped));
    assert_eq!(cluster.samples(), 1);
}

#[tokio::test]
async fn test_run_marks_ready_after_first_poll() {
    let cluster = MockCluster::new(3, 4);
    let health = HealthRegistry::new();
    let mut controller = ControllerBuilder::new()
        .cluster(cluster)
        .reloader(ConfigReloader::new(config()))
        .health(health.clone())
        .build()
        .unwrap();

    assert!(!health.readiness().await.ready);

    let (stop, stop_rx) = broadcast::channel(1);
    stop.send(()).unwrap();
    controller.run(stop_rx).await.unwrap();

    // Readiness is withdrawn again on stop; the components stay registered.
    assert!(!health.readiness().await.ready);
    assert_eq!(health.health().await.components.len(), 3);
}
