//! Error types for the autoscaler library
//!
//! Every per-cycle error is caught at the poll cycle boundary and logged;
//! none of them stop the controller.

use thiserror::Error;

/// Failures parsing a quantity string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,

    #[error("invalid quantity {0:?}")]
    Invalid(String),

    #[error("unknown quantity suffix {suffix:?} in {input:?}")]
    UnknownSuffix { input: String, suffix: String },

    #[error("quantity {0:?} is out of range")]
    OutOfRange(String),
}

/// Failures computing a target from a scaling rule
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScalingError {
    /// A value or intermediate result does not fit in signed 64-bit milli-units
    #[error("{what} overflows the milli-unit range")]
    Overflow { what: String },
}

impl ScalingError {
    pub(crate) fn overflow(what: impl Into<String>) -> Self {
        ScalingError::Overflow { what: what.into() }
    }
}

/// Failures reading or parsing the scaling configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config source {source_name}: {message}")]
    Source {
        source_name: String,
        message: String,
        #[source]
        cause: Option<std::io::Error>,
    },

    #[error("invalid scaling config: {0}")]
    Parse(String),
}

impl ConfigError {
    pub(crate) fn io(source_name: impl Into<String>, message: &str, err: std::io::Error) -> Self {
        ConfigError::Source {
            source_name: source_name.into(),
            message: message.to_string(),
            cause: Some(err),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

/// Failures talking to the cluster
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("failed to query cluster size: {0}")]
    Query(String),

    #[error("failed to apply resources: {0}")]
    Apply(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),
}

/// Misuse of the controller
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("controller has already stopped")]
    AlreadyStopped,

    #[error("controller is already running")]
    AlreadyRunning,

    #[error("{0} is required")]
    Missing(&'static str),

    #[error("poll period must be non-zero")]
    ZeroPollPeriod,
}
