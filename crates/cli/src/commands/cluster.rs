//! `cluster`: preview targets for the cluster the kubeconfig points at

use anyhow::{Context, Result};
use cpvpa_lib::cluster::{connect_client, sample_nodes};
use std::path::Path;

use super::preview::print_targets;
use crate::output::OutputFormat;

pub async fn run(path: &Path, kubeconfig: Option<&Path>, format: OutputFormat) -> Result<()> {
    let config = super::load_config(path).await?;

    let client = connect_client(kubeconfig).await?;
    let sample = sample_nodes(&client)
        .await
        .context("Failed to sample cluster size")?;

    print_targets(&config, &sample, format)
}
