//! `preview`: compute the targets for a given cluster size

use anyhow::Result;
use cpvpa_lib::{compute_requirements, ClusterSample, RequirementClass, ScalingConfig};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use crate::output::{color_error, print_info, print_table, print_warning, OutputFormat};

/// Computed target for one resource, or why there isn't one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Tabled)]
pub struct TargetRow {
    #[tabled(rename = "Container")]
    pub container: String,
    #[tabled(rename = "Class")]
    pub class: String,
    #[tabled(rename = "Resource")]
    pub resource: String,
    #[tabled(rename = "Target")]
    pub target: String,
    #[tabled(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Evaluate `config` for `sample`, keeping failed resources as error rows
pub fn target_rows(config: &ScalingConfig, sample: &ClusterSample) -> Vec<TargetRow> {
    let computation = compute_requirements(config, sample);
    let mut rows = Vec::new();

    for (container, reqs) in &computation.requirements {
        for class in RequirementClass::ALL {
            for (resource, quantity) in reqs.class(class) {
                rows.push(TargetRow {
                    container: container.clone(),
                    class: class.to_string(),
                    resource: resource.clone(),
                    target: quantity.to_string(),
                    error: None,
                });
            }
        }
    }
    for failure in computation.failures {
        rows.push(TargetRow {
            container: failure.container,
            class: failure.class.to_string(),
            resource: failure.resource,
            target: "error".to_string(),
            error: Some(failure.error.to_string()),
        });
    }

    rows.sort_by(|a, b| {
        (&a.container, class_rank(&a.class), &a.resource).cmp(&(
            &b.container,
            class_rank(&b.class),
            &b.resource,
        ))
    });
    rows
}

fn class_rank(class: &str) -> u8 {
    match class {
        "requests" => 0,
        _ => 1,
    }
}

/// Print targets for `sample`, with error rows colored in tables
pub fn print_targets(config: &ScalingConfig, sample: &ClusterSample, format: OutputFormat) -> Result<()> {
    let rows = target_rows(config, sample);

    match format {
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct Report<'a> {
                sample: &'a ClusterSample,
                targets: &'a [TargetRow],
            }
            let report = Report {
                sample,
                targets: &rows,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Table => {
            print_info(&format!("{} nodes, {} cores", sample.nodes, sample.cores));
            let failures: Vec<_> = rows.iter().filter_map(|r| r.error.clone()).collect();
            let display: Vec<TargetRow> = rows
                .into_iter()
                .map(|mut row| {
                    if row.error.is_some() {
                        row.target = color_error(&row.target);
                    }
                    row
                })
                .collect();
            print_table(&display, format, "Config defines no rules")?;
            for failure in failures {
                print_warning(&failure);
            }
        }
    }
    Ok(())
}

pub async fn run(path: &Path, nodes: u64, cores: u64, format: OutputFormat) -> Result<()> {
    let config = super::load_config(path).await?;
    print_targets(&config, &ClusterSample::new(nodes, cores), format)
}
