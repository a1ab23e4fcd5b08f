//! Kubernetes API implementation of [`ClusterClient`]

use super::{ClusterClient, TargetKind, TargetSpec};
use crate::error::ClusterError;
use crate::models::{ClusterSample, ResourceRequirementSet};
use crate::quantity::Quantity;
use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::{Container, Node, ResourceRequirements as K8sResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity as K8sQuantity;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{ListParams, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config, Resource};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::Path;
use tracing::{debug, info};

/// Build an API client from an explicit kubeconfig, or infer one from the
/// in-cluster service account and the usual kubeconfig locations.
pub async fn connect_client(kubeconfig: Option<&Path>) -> Result<Client> {
    let config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .context("Failed to load kubeconfig")?
        }
        None => Config::infer()
            .await
            .context("Failed to infer cluster configuration")?,
    };

    Client::try_from(config).context("Failed to create Kubernetes client")
}

/// Count all nodes and sum their CPU capacity.
///
/// Cores are taken from `status.capacity.cpu`, not allocatable, rounded up
/// per node. Every node counts regardless of readiness or schedulability.
pub async fn sample_nodes(client: &Client) -> Result<ClusterSample, ClusterError> {
    let nodes: Api<Node> = Api::all(client.clone());
    let list = nodes
        .list(&ListParams::default())
        .await
        .map_err(|e| ClusterError::Query(e.to_string()))?;

    let mut cores: u64 = 0;
    for node in &list.items {
        let Some(cpu) = node
            .status
            .as_ref()
            .and_then(|s| s.capacity.as_ref())
            .and_then(|c| c.get("cpu"))
        else {
            continue;
        };
        let cpu = Quantity::parse(&cpu.0).map_err(|e| ClusterError::Query(e.to_string()))?;
        let node_cores = cpu
            .ceil_units()
            .and_then(|c| u64::try_from(c).ok())
            .ok_or_else(|| ClusterError::Query(format!("invalid cpu capacity {}", cpu)))?;
        cores = cores
            .checked_add(node_cores)
            .ok_or_else(|| ClusterError::Query("total cpu capacity overflows".to_string()))?;
    }

    Ok(ClusterSample::new(list.items.len() as u64, cores))
}

/// Translate computed requirements into a strategic merge patch of the pod
/// template. Containers merge by name and are emitted in name order.
pub fn build_patch(requirements: &ResourceRequirementSet) -> Value {
    fn to_k8s(values: &BTreeMap<String, Quantity>) -> Option<BTreeMap<String, K8sQuantity>> {
        if values.is_empty() {
            return None;
        }
        Some(
            values
                .iter()
                .map(|(name, q)| (name.clone(), K8sQuantity(q.to_string())))
                .collect(),
        )
    }

    let containers: Vec<Container> = requirements
        .iter()
        .map(|(name, reqs)| Container {
            name: name.clone(),
            resources: Some(K8sResourceRequirements {
                requests: to_k8s(&reqs.requests),
                limits: to_k8s(&reqs.limits),
                ..Default::default()
            }),
            ..Default::default()
        })
        .collect();

    json!({ "spec": { "template": { "spec": { "containers": containers } } } })
}

/// Cluster client backed by the Kubernetes API server
pub struct KubeClusterClient {
    client: Client,
    target: TargetSpec,
    dry_run: bool,
}

impl KubeClusterClient {
    /// Connect and verify that the target exists
    pub async fn connect(
        kubeconfig: Option<&Path>,
        target: TargetSpec,
        dry_run: bool,
    ) -> Result<Self> {
        let client = connect_client(kubeconfig).await?;
        let scaler = Self::from_client(client, target, dry_run);

        scaler
            .verify_target()
            .await
            .with_context(|| {
                format!(
                    "Failed to find target {} in namespace {}",
                    scaler.target, scaler.target.namespace
                )
            })?;

        info!(
            workload = %scaler.target,
            namespace = %scaler.target.namespace,
            dry_run,
            "Connected to cluster"
        );
        Ok(scaler)
    }

    /// Wrap an existing client without checking the target
    pub fn from_client(client: Client, target: TargetSpec, dry_run: bool) -> Self {
        Self {
            client,
            target,
            dry_run,
        }
    }

    pub fn target(&self) -> &TargetSpec {
        &self.target
    }

    async fn verify_target(&self) -> Result<(), kube::Error> {
        match self.target.kind {
            TargetKind::Deployment => self.get::<Deployment>().await,
            TargetKind::DaemonSet => self.get::<DaemonSet>().await,
            TargetKind::ReplicaSet => self.get::<ReplicaSet>().await,
        }
    }

    async fn get<K>(&self) -> Result<(), kube::Error>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), &self.target.namespace);
        api.get(&self.target.name).await.map(|_| ())
    }

    async fn patch<K>(&self, patch: &Patch<Value>) -> Result<(), kube::Error>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), &self.target.namespace);
        api.patch(&self.target.name, &PatchParams::default(), patch)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn sample_cluster_size(&self) -> Result<ClusterSample, ClusterError> {
        sample_nodes(&self.client).await
    }

    async fn apply(&self, requirements: &ResourceRequirementSet) -> Result<(), ClusterError> {
        let body = build_patch(requirements);

        if self.dry_run {
            info!(workload = %self.target, patch = %body, "Dry run, not patching target");
            return Ok(());
        }

        debug!(workload = %self.target, patch = %body, "Patching target");
        let patch = Patch::Strategic(body);
        let result = match self.target.kind {
            TargetKind::Deployment => self.patch::<Deployment>(&patch).await,
            TargetKind::DaemonSet => self.patch::<DaemonSet>(&patch).await,
            TargetKind::ReplicaSet => self.patch::<ReplicaSet>(&patch).await,
        };

        result.map_err(|e| ClusterError::Apply(format!("{}: {}", self.target, e)))
    }
}
