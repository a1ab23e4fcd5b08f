//! `validate`: check a config file and show the rules it defines

use anyhow::Result;
use cpvpa_lib::{RequirementClass, ScalingConfig};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use crate::output::{or_dash, print_success, print_table, OutputFormat};

/// One rule of the config
#[derive(Debug, Serialize, Tabled)]
pub struct RuleRow {
    #[tabled(rename = "Container")]
    pub container: String,
    #[tabled(rename = "Class")]
    pub class: String,
    #[tabled(rename = "Resource")]
    pub resource: String,
    #[tabled(rename = "Base")]
    pub base: String,
    #[tabled(rename = "Max")]
    pub max: String,
    #[tabled(rename = "Step")]
    pub step: String,
    #[tabled(rename = "Cores/Step")]
    pub cores_per_step: String,
    #[tabled(rename = "Nodes/Step")]
    pub nodes_per_step: String,
}

/// Flatten a config into one row per rule, in container, class, resource order
pub fn rule_rows(config: &ScalingConfig) -> Vec<RuleRow> {
    let mut rows = Vec::new();
    for (container, cfg) in config {
        for class in RequirementClass::ALL {
            for (resource, rule) in cfg.rules(class) {
                rows.push(RuleRow {
                    container: container.clone(),
                    class: class.to_string(),
                    resource: resource.clone(),
                    base: or_dash(rule.base),
                    max: or_dash(rule.max),
                    step: or_dash(rule.step),
                    cores_per_step: or_dash(rule.cores_per_step),
                    nodes_per_step: or_dash(rule.nodes_per_step),
                });
            }
        }
    }
    rows
}

pub async fn run(path: &Path, format: OutputFormat) -> Result<()> {
    let config = super::load_config(path).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        OutputFormat::Table => {
            print_table(&rule_rows(&config), format, "Config defines no rules")?;
            print_success(&format!(
                "{} is valid ({} containers)",
                path.display(),
                config.len()
            ));
        }
    }
    Ok(())
}
