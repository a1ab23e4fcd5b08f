//! Access to the cluster being measured and the workload being scaled
//!
//! The controller only sees the [`ClusterClient`] trait. How the target is
//! addressed and patched is entirely up to the implementation.

mod kubernetes;
mod target;

pub use kubernetes::{build_patch, connect_client, sample_nodes, KubeClusterClient};
pub use target::{TargetKind, TargetSpec};

use crate::error::ClusterError;
use crate::models::{ClusterSample, ResourceRequirementSet};
use async_trait::async_trait;

/// Capabilities the controller needs from the cluster
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Count every node, schedulable or not, and sum their CPU capacity
    async fn sample_cluster_size(&self) -> Result<ClusterSample, ClusterError>;

    /// Set the requests and limits of the target's containers, all or nothing
    async fn apply(&self, requirements: &ResourceRequirementSet) -> Result<(), ClusterError>;
}
