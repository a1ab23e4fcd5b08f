//! Scaling target identification

use crate::error::ClusterError;
use std::fmt;

/// Workload kinds whose pod template can be patched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Deployment,
    DaemonSet,
    ReplicaSet,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Deployment => "deployment",
            TargetKind::DaemonSet => "daemonset",
            TargetKind::ReplicaSet => "replicaset",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The workload whose containers are resized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub kind: TargetKind,
    pub name: String,
    pub namespace: String,
}

impl TargetSpec {
    /// Parse `kind/name`; the kind is matched case-insensitively
    pub fn parse(target: &str, namespace: &str) -> Result<Self, ClusterError> {
        let Some((kind, name)) = target.split_once('/') else {
            return Err(ClusterError::InvalidTarget(format!(
                "{:?} must have the form <kind>/<name>",
                target
            )));
        };

        let kind = match kind.to_ascii_lowercase().as_str() {
            "deployment" => TargetKind::Deployment,
            "daemonset" => TargetKind::DaemonSet,
            "replicaset" => TargetKind::ReplicaSet,
            other => {
                return Err(ClusterError::InvalidTarget(format!(
                    "unknown kind {:?}: must be one of deployment, daemonset or replicaset",
                    other
                )))
            }
        };

        if name.is_empty() || name.contains('/') {
            return Err(ClusterError::InvalidTarget(format!(
                "invalid name in {:?}",
                target
            )));
        }
        if namespace.is_empty() {
            return Err(ClusterError::InvalidTarget("namespace must not be empty".to_string()));
        }

        Ok(Self {
            kind,
            name: name.to_string(),
            namespace: namespace.to_string(),
        })
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}
