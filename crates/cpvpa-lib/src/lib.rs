//! Cluster-proportional vertical autoscaling
//!
//! This crate provides the core functionality for:
//! - Scaling rules and the function that turns cluster size into targets
//! - Hot reload of the scaling configuration
//! - Suppression of redundant updates
//! - The poll loop and the cluster it talks to
//! - Health checks and observability

pub mod cluster;
pub mod controller;
pub mod debounce;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod quantity;
pub mod reload;
pub mod scaling;

pub use cluster::{ClusterClient, KubeClusterClient, TargetKind, TargetSpec};
pub use controller::{Controller, ControllerBuilder, ControllerState, PollOutcome};
pub use error::{ClusterError, ConfigError, ControllerError, QuantityError, ScalingError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ScalerMetrics, StructuredLogger};
pub use quantity::{Format, Quantity};
pub use reload::{ConfigReloader, ConfigSource, FileConfigSource, Reload};
pub use scaling::{calculate, compute_requirements, Computation, ResourceFailure};
