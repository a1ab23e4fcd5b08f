//! Command-line flags

use anyhow::{bail, Context, Result};
use clap::Parser;
use cpvpa_lib::{ConfigReloader, FileConfigSource, ScalingConfig, TargetSpec};
use std::path::PathBuf;
use std::time::Duration;

/// Scales the resources of a workload in proportion to the cluster's size
#[derive(Debug, Parser)]
#[command(name = "cpvpa", version, long_about = None)]
pub struct Options {
    /// Workload to scale, as <kind>/<name> (deployment, daemonset or replicaset)
    #[arg(long)]
    pub target: String,

    /// Namespace of the target
    #[arg(long, env = "MY_NAMESPACE")]
    pub namespace: String,

    /// Scaling config as inline JSON, used for containers the file doesn't mention
    #[arg(long)]
    pub default_config: Option<String>,

    /// Scaling config file, reloaded whenever it changes
    #[arg(long)]
    pub config_file: Option<PathBuf>,

    /// Seconds between polls of the cluster size
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_period_seconds: u64,

    /// Kubeconfig for running outside the cluster
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Log the updates that would be made instead of making them
    #[arg(long)]
    pub dry_run: bool,
}

impl Options {
    /// Reject flag combinations clap can't express
    pub fn validate(&self) -> Result<()> {
        if self.default_config.is_none() && self.config_file.is_none() {
            bail!("at least one of --default-config or --config-file is required");
        }
        Ok(())
    }

    /// Read and parse the config file once when there is no default to fall
    /// back on, so a broken file stops the process instead of every poll
    pub async fn check_config_file(&self) -> Result<()> {
        let (None, Some(path)) = (&self.default_config, &self.config_file) else {
            return Ok(());
        };

        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read --config-file {}", path.display()))?;
        if !bytes.iter().all(u8::is_ascii_whitespace) {
            ScalingConfig::from_json(&bytes)
                .with_context(|| format!("Invalid --config-file {}", path.display()))?;
        }
        Ok(())
    }

    pub fn target_spec(&self) -> Result<TargetSpec> {
        TargetSpec::parse(&self.target, &self.namespace).context("Invalid --target")
    }

    pub fn poll_period(&self) -> Duration {
        Duration::from_secs(self.poll_period_seconds)
    }

    /// Parse the default config and attach the config file, if any
    pub fn reloader(&self) -> Result<ConfigReloader> {
        let default = match &self.default_config {
            Some(json) => {
                ScalingConfig::from_json(json.as_bytes()).context("Invalid --default-config")?
            }
            None => ScalingConfig::new(),
        };

        Ok(match &self.config_file {
            Some(path) => ConfigReloader::with_source(default, Box::new(FileConfigSource::new(path))),
            None => ConfigReloader::new(default),
        })
    }
}
