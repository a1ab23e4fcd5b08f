//! The poll loop that keeps the target's resources in line with cluster size
//!
//! A [`Controller`] moves through `Idle -> Running -> Stopped`. While
//! running it performs one poll cycle immediately and then one per tick,
//! never overlapping cycles and never retrying inside a cycle.

mod r#loop;

#[cfg(test)]
mod tests;

pub use r#loop::{Controller, ControllerBuilder, DEFAULT_POLL_PERIOD};

/// Lifecycle of a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Running,
    /// Terminal
    Stopped,
}

/// How a single poll cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Sampling the cluster size failed; nothing else was attempted
    ClusterUnavailable,
    /// No configuration could be loaded this cycle
    ConfigUnavailable,
    /// Computed requirements matched the last applied set
    Unchanged,
    Applied,
    /// The update was rejected; it is retried next cycle
    ApplyFailed,
}

impl PollOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollOutcome::ClusterUnavailable => "cluster_unavailable",
            PollOutcome::ConfigUnavailable => "config_unavailable",
            PollOutcome::Unchanged => "unchanged",
            PollOutcome::Applied => "applied",
            PollOutcome::ApplyFailed => "apply_failed",
        }
    }
}
