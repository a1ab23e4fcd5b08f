//! cpvpa - cluster-proportional vertical autoscaler
//!
//! Runs next to a single workload and keeps its container requests and
//! limits proportional to the number of nodes and cores in the cluster.

use anyhow::{bail, Context, Result};
use clap::Parser;
use cpvpa_lib::{
    ControllerBuilder, HealthRegistry, KubeClusterClient, ScalerMetrics, StructuredLogger,
};
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;
mod options;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn init_tracing(format: config::LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        config::LogFormat::Json => registry.with(fmt::layer().json()).init(),
        config::LogFormat::Pretty => registry.with(fmt::layer().pretty()).init(),
    }
}

/// Resolves on SIGINT or SIGTERM
#[cfg(unix)]
async fn shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            Ok("SIGINT received")
        }
        _ = terminate.recv() => Ok("SIGTERM received"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("SIGINT received")
}

#[tokio::main]
async fn main() -> Result<()> {
    let options = options::Options::parse();
    let settings = config::ProcessConfig::load()?;
    init_tracing(settings.log_format);

    options.validate()?;
    let target = options.target_spec()?;
    let reloader = options.reloader()?;
    options.check_config_file().await?;

    let logger = StructuredLogger::new(target.to_string());
    let health_registry = HealthRegistry::new();
    let metrics = ScalerMetrics::new().context("Failed to register metrics")?;

    let cluster = KubeClusterClient::connect(options.kubeconfig.as_deref(), target, options.dry_run)
        .await?;

    let config_source = options.config_file.as_ref().map(|p| p.display().to_string());
    logger.log_startup(VERSION, options.poll_period_seconds, config_source.as_deref());

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics.clone()));
    let mut api_handle = tokio::spawn(api::serve(settings.api_port, app_state));

    let (ready_tx, ready_rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let mut controller = ControllerBuilder::new()
        .cluster(Arc::new(cluster))
        .reloader(reloader)
        .poll_period(options.poll_period())
        .logger(logger.clone())
        .metrics(metrics)
        .health(health_registry)
        .ready(ready_tx)
        .build()?;

    let controller_handle = tokio::spawn(async move { controller.run(shutdown_rx).await });
    if ready_rx.await.is_err() {
        warn!("Controller exited before becoming ready");
    }

    let api_exit = tokio::select! {
        reason = shutdown_signal() => {
            let reason = reason?;
            info!(reason, "Shutting down");
            None
        }
        served = &mut api_handle => Some(served),
    };

    // The controller may already be gone if it failed; that's reported below.
    let _ = shutdown_tx.send(());
    controller_handle
        .await
        .context("Controller task panicked")??;

    match api_exit {
        None => {
            api_handle.abort();
            Ok(())
        }
        Some(served) => {
            served.context("API server task panicked")??;
            bail!("API server stopped unexpectedly")
        }
    }
}
