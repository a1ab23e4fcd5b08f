//! cpvpactl - tune cluster-proportional scaling rules
//!
//! Validates scaling configs and previews the targets they produce, either
//! for hypothetical cluster sizes or for a live cluster.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{cluster, preview, sweep, validate};
use std::path::PathBuf;

/// Cluster-proportional vertical autoscaler tooling
#[derive(Parser)]
#[command(name = "cpvpactl")]
#[command(author, version, about = "Preview cluster-proportional scaling rules", long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check a config file and list its rules
    Validate {
        /// Scaling config file
        #[arg(long, short)]
        config: PathBuf,
    },

    /// Compute targets for a given cluster size
    Preview {
        /// Scaling config file
        #[arg(long, short)]
        config: PathBuf,

        /// Number of nodes
        #[arg(long)]
        nodes: u64,

        /// Total number of cores
        #[arg(long)]
        cores: u64,
    },

    /// Compute targets across a range of cluster sizes
    Sweep {
        /// Scaling config file
        #[arg(long, short)]
        config: PathBuf,

        /// Largest node count to evaluate
        #[arg(long)]
        max_nodes: u64,

        /// Cores on each node
        #[arg(long)]
        cores_per_node: u64,

        /// Nodes between evaluated sizes
        #[arg(long, default_value_t = 1)]
        step: u64,
    },

    /// Compute targets for the current cluster
    Cluster {
        /// Scaling config file
        #[arg(long, short)]
        config: PathBuf,

        /// Path to kubeconfig file (defaults to $KUBECONFIG, then ~/.kube/config)
        #[arg(long)]
        kubeconfig: Option<PathBuf>,
    },
}

async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Validate { config } => validate::run(&config, cli.format).await,
        Commands::Preview {
            config,
            nodes,
            cores,
        } => preview::run(&config, nodes, cores, cli.format).await,
        Commands::Sweep {
            config,
            max_nodes,
            cores_per_node,
            step,
        } => sweep::run(&config, max_nodes, cores_per_node, step, cli.format).await,
        Commands::Cluster { config, kubeconfig } => {
            cluster::run(&config, kubeconfig.as_deref(), cli.format).await
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = execute(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
