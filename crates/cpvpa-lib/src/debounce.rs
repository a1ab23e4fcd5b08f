//! Suppression of redundant updates
//!
//! The baseline only moves when an apply succeeds, so a failed apply is
//! retried on the next cycle with the same delta.

use crate::models::ResourceRequirementSet;

/// Remembers the last successfully applied requirement set
#[derive(Debug, Default)]
pub struct Debouncer {
    baseline: Option<ResourceRequirementSet>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `next` differs from the baseline, or there is no baseline yet
    pub fn needs_apply(&self, next: &ResourceRequirementSet) -> bool {
        self.baseline.as_ref() != Some(next)
    }

    /// Adopt `applied` as the new baseline
    pub fn record_applied(&mut self, applied: ResourceRequirementSet) {
        self.baseline = Some(applied);
    }

    pub fn baseline(&self) -> Option<&ResourceRequirementSet> {
        self.baseline.as_ref()
    }
}
