//! `sweep`: show how targets move as the cluster grows

use anyhow::{bail, Result};
use cpvpa_lib::{ClusterSample, ScalingConfig};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tabled::Tabled;

use super::preview::target_rows;
use crate::output::{color_change, print_table, OutputFormat};

/// Target of one resource at one cluster size
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct SweepRow {
    #[tabled(rename = "Nodes")]
    pub nodes: u64,
    #[tabled(rename = "Cores")]
    pub cores: u64,
    #[tabled(rename = "Container")]
    pub container: String,
    #[tabled(rename = "Class")]
    pub class: String,
    #[tabled(rename = "Resource")]
    pub resource: String,
    #[tabled(rename = "Target")]
    pub target: String,
    /// Whether the target differs from the previous size
    #[tabled(skip)]
    pub changed: bool,
}

/// Cluster sizes from 1 node up to `max_nodes`, `step` nodes apart
pub fn sizes(max_nodes: u64, cores_per_node: u64, step: u64) -> Result<Vec<ClusterSample>> {
    if step == 0 {
        bail!("--step must be at least 1");
    }
    (1..=max_nodes)
        .step_by(step as usize)
        .map(|nodes| match nodes.checked_mul(cores_per_node) {
            Some(cores) => Ok(ClusterSample::new(nodes, cores)),
            None => bail!("{} nodes of {} cores is too many cores", nodes, cores_per_node),
        })
        .collect()
}

/// Evaluate `config` at every size, flagging targets that moved
pub fn sweep_rows(config: &ScalingConfig, samples: &[ClusterSample]) -> Vec<SweepRow> {
    let mut previous: BTreeMap<(String, String, String), String> = BTreeMap::new();
    let mut rows = Vec::new();

    for sample in samples {
        for row in target_rows(config, sample) {
            let key = (row.container.clone(), row.class.clone(), row.resource.clone());
            let changed = previous
                .insert(key, row.target.clone())
                .is_some_and(|before| before != row.target);
            rows.push(SweepRow {
                nodes: sample.nodes,
                cores: sample.cores,
                container: row.container,
                class: row.class,
                resource: row.resource,
                target: row.target,
                changed,
            });
        }
    }
    rows
}

pub async fn run(
    path: &Path,
    max_nodes: u64,
    cores_per_node: u64,
    step: u64,
    format: OutputFormat,
) -> Result<()> {
    let config = super::load_config(path).await?;
    let rows = sweep_rows(&config, &sizes(max_nodes, cores_per_node, step)?);

    let rows = match format {
        OutputFormat::Json => rows,
        OutputFormat::Table => rows
            .into_iter()
            .map(|mut row| {
                row.target = color_change(&row.target, row.changed);
                row
            })
            .collect(),
    };
    print_table(&rows, format, "Config defines no rules")
}
