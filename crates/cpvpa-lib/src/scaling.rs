//! The scaling function
//!
//! ```text
//! core_steps = round_up_div(cores, cores_per_step)
//! node_steps = round_up_div(nodes, nodes_per_step)
//! by_cores   = base + step * core_steps
//! by_nodes   = base + step * node_steps
//! if max > 0: cap both by_cores and by_nodes at max
//! target     = max(by_cores, by_nodes)
//! ```
//!
//! All arithmetic is checked `i64` milli-units. The cap is applied to each
//! axis before the two are compared.

use crate::error::ScalingError;
use crate::models::{
    ClusterSample, RequirementClass, ResourceRequirementSet, ScalingConfig, ScalingRule,
};
use crate::quantity::{guess_format, Quantity};

/// Number of whole steps `count` spans, rounding up.
///
/// Returns 0 when `per` is zero or negative, which disables the axis.
pub fn round_up_div(count: u64, per: i64) -> u64 {
    if per <= 0 {
        return 0;
    }
    if per == 1 {
        return count;
    }
    count.div_ceil(per as u64)
}

fn milli_or_zero(quantity: Option<&Quantity>, field: &str) -> Result<i64, ScalingError> {
    match quantity {
        Some(q) => q
            .milli_value()
            .map_err(|_| ScalingError::overflow(format!("{} {}", field, q))),
        None => Ok(0),
    }
}

fn along_axis(base: i64, step: i64, steps: u64, axis: &str) -> Result<i64, ScalingError> {
    i64::try_from(steps)
        .ok()
        .and_then(|steps| step.checked_mul(steps))
        .and_then(|growth| base.checked_add(growth))
        .ok_or_else(|| ScalingError::overflow(format!("{} target", axis)))
}

/// Target quantity, in milli-units, for one rule and one cluster sample
pub fn calculate(rule: &ScalingRule, sample: &ClusterSample) -> Result<i64, ScalingError> {
    let base = milli_or_zero(rule.base.as_ref(), "base")?;
    let max = milli_or_zero(rule.max.as_ref(), "max")?;
    let step = milli_or_zero(rule.step.as_ref(), "step")?;

    let core_steps = round_up_div(sample.cores, rule.cores_per_step.unwrap_or(0));
    let node_steps = round_up_div(sample.nodes, rule.nodes_per_step.unwrap_or(0));

    let mut by_cores = along_axis(base, step, core_steps, "by-cores")?;
    let mut by_nodes = along_axis(base, step, node_steps, "by-nodes")?;

    if max > 0 {
        by_cores = by_cores.min(max);
        by_nodes = by_nodes.min(max);
    }

    Ok(by_cores.max(by_nodes))
}

/// A resource whose target could not be computed this cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFailure {
    pub container: String,
    pub class: RequirementClass,
    pub resource: String,
    pub error: ScalingError,
}

/// Outcome of evaluating a whole configuration against one sample
#[derive(Debug, Clone, Default)]
pub struct Computation {
    /// Targets for every resource that computed cleanly
    pub requirements: ResourceRequirementSet,
    /// Resources left out of `requirements`
    pub failures: Vec<ResourceFailure>,
}

/// Evaluate every container, class and resource of `config`.
///
/// A failing resource is reported in [`Computation::failures`] and omitted
/// from the result; the others are unaffected.
pub fn compute_requirements(config: &ScalingConfig, sample: &ClusterSample) -> Computation {
    let mut computation = Computation::default();

    for (container, cfg) in config {
        // Containers are always present in the output, even with no rules.
        computation.requirements.container_mut(container);

        for class in RequirementClass::ALL {
            for (resource, rule) in cfg.rules(class) {
                match calculate(rule, sample) {
                    Ok(milli) => {
                        let quantity = Quantity::from_milli(milli, guess_format(resource));
                        computation
                            .requirements
                            .container_mut(container)
                            .class_mut(class)
                            .insert(resource.clone(), quantity);
                    }
                    Err(error) => computation.failures.push(ResourceFailure {
                        container: container.clone(),
                        class,
                        resource: resource.clone(),
                        error,
                    }),
                }
            }
        }
    }

    computation
}
