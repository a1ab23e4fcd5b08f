//! Process settings that aren't part of the command line

use anyhow::{Context, Result};
use serde::Deserialize;

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Ambient process settings, read from `CPVPA_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessConfig {
    /// Port for the health and metrics server
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_api_port() -> u16 {
    8080
}

impl ProcessConfig {
    /// Load settings from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("CPVPA"))
            .build()?;
        Self::from_config(config)
    }

    fn from_config(config: config::Config) -> Result<Self> {
        config
            .try_deserialize()
            .context("Invalid CPVPA_* settings")
    }
}
