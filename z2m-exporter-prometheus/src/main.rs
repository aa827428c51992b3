//! Prometheus exporter for a zigbee2mqtt instance.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use z2m_exporter_prometheus::{ExporterConfig, PrometheusMetrics};
use z2m_extension_framework::{ExtensionArgs, ExtensionConfig, ExtensionRunner};

/// Prometheus exporter for zigbee2mqtt.
#[derive(Parser, Debug)]
#[command(name = "z2m-exporter-prometheus")]
#[command(about = "Export zigbee2mqtt network state as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ExporterConfig::load(path)?,
        None => ExporterConfig::default(),
    };

    if let Some(listen) = args.listen {
        config.prometheus.listen = listen;
        config.validate()?;
    }

    let runner_args = ExtensionArgs {
        config: args.config.unwrap_or_default(),
        log_level: args.log_level,
    };

    let mut runner =
        ExtensionRunner::new_with_args("z2m-exporter-prometheus", config, Some(&runner_args))
            .await?
            .with_status_publishing();

    let extension =
        PrometheusMetrics::new(runner.context().clone(), runner.config().prometheus.clone())?;
    runner.add(extension);

    runner.run().await?;

    info!("Exporter stopped");
    Ok(())
}
