//! Subcommand implementations

pub mod cluster;
pub mod preview;
pub mod sweep;
pub mod validate;

use anyhow::{Context, Result};
use cpvpa_lib::ScalingConfig;
use std::path::Path;

/// Read and parse a scaling config file
pub async fn load_config(path: &Path) -> Result<ScalingConfig> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    ScalingConfig::from_json(&bytes).with_context(|| format!("Invalid config in {}", path.display()))
}
