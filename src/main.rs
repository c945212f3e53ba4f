use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tigowatch::duration::format_duration;
use tigowatch::{Collector, Overrides, Settings};
use tigowatch_exporter::{MetricsState, PrometheusConfig, PrometheusExporter};
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "tigowatch")]
#[command(about = "Prometheus exporter for Tigo optimizer telemetry")]
struct Args {
    /// Directory searched for the newest dataset
    data_dir: Option<PathBuf>,

    /// Address to bind the metrics server to
    #[arg(long)]
    bind_ip: Option<String>,

    /// Port to bind the metrics server to
    #[arg(long)]
    bind_port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Config file (TOML, YAML or JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Poll interval (e.g., "10s", "500ms")
    #[arg(long)]
    interval: Option<String>,

    /// Clear device metrics when the dataset is older than this (e.g., "10m")
    #[arg(long)]
    stale_after: Option<String>,

    /// Run a single collection, write the snapshot as JSON and exit
    #[arg(short, long)]
    export: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let overrides = Overrides {
        data_dir: args.data_dir,
        bind_ip: args.bind_ip,
        bind_port: args.bind_port,
        verbose: args.verbose.then_some(true),
        poll_interval: args.interval,
        stale_after: args.stale_after,
    };
    let settings = Settings::load(args.config.as_deref(), &overrides)?;

    tracing_subscriber::fmt()
        .with_max_level(if settings.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .init();

    let state = Arc::new(MetricsState::new());
    let collector = Collector::builder(&settings.data_dir)
        .state(state.clone())
        .interval(settings.poll_interval()?)
        .stale_after(settings.stale_after()?)
        .max_fail_count(settings.max_fail_count)
        .build();

    // Handle export mode (non-interactive)
    if let Some(export_path) = args.export {
        return export_to_file(collector, &export_path);
    }

    let mut config = PrometheusConfig::builder()
        .listen_addr(settings.listen_addr())
        .metrics_path(settings.metrics_path.clone());
    if let Some(namespace) = &settings.namespace {
        config = config.namespace(namespace.clone());
    }

    let server = PrometheusExporter::new(config.build(), state)
        .bind()
        .await?;
    info!("Now listening on {}", server.local_addr()?);

    info!(
        dir = %settings.data_dir.display(),
        "Polling for datasets every {}",
        format_duration(collector.interval())
    );
    let handle = collector.start();

    tokio::select! {
        _ = server.run() => {
            handle.shutdown().await;
        }
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutting down");
            handle.shutdown().await;
        }
    }

    Ok(())
}

/// Run one collection cycle and write the resulting snapshot to `path`.
fn export_to_file(mut collector: Collector, path: &Path) -> Result<()> {
    let outcome = collector.poll_once()?;
    info!("Collection finished: {:?}", outcome);

    let json = serde_json::to_string_pretty(&collector.state().snapshot())?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Exported snapshot to {}", path.display());
    Ok(())
}
