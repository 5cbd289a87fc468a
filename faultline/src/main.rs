//! Faultline service binary.
//!
//! Wires the pieces together: configuration, logging, the topology
//! oracle, the analyzer and the HTTP server, with graceful shutdown on
//! CTRL+C or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use faultline_analysis::Analyzer;
use faultline_api::{ApiConfig, ApiServer};
use faultline_core::config::ServiceConfig;
use faultline_topology::SnapshotOracle;

/// Faultline CLI arguments
#[derive(Debug, Parser)]
#[clap(name = "faultline", version, about = "Topology-aware alarm root-cause analysis")]
struct Cli {
    /// Configuration file path
    #[clap(short, long, default_value = "config/faultline.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[clap(long, env = "FAULTLINE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[clap(long, env = "FAULTLINE_LOG_JSON")]
    log_json: bool,

    /// Validate configuration and exit without serving
    #[clap(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    info!("Starting Faultline v{}", env!("CARGO_PKG_VERSION"));
    info!("Loading configuration from: {:?}", cli.config);

    let config = ServiceConfig::from_file(&cli.config).context("Failed to load configuration")?;
    info!("Configuration loaded successfully");

    if cli.dry_run {
        info!("Dry run mode - configuration validated, exiting");
        return Ok(());
    }

    info!(path = %config.topology.snapshot_path, "Loading topology snapshot...");
    let oracle = SnapshotOracle::from_file(&config.topology.snapshot_path)
        .context("Failed to load topology snapshot")?;
    info!("Topology snapshot indexed");

    let analyzer = Analyzer::new(
        Arc::new(oracle),
        None,
        config.analyzer.clone(),
        config.prompt.clone(),
    )
    .context("Failed to create analyzer")?;
    info!("Analyzer initialized");

    let api_config = ApiConfig {
        bind_addr: config
            .server
            .listen
            .parse()
            .context("Invalid server listen address")?,
        timeout_secs: config.server.request_timeout_secs,
        cors_origins: vec!["*".to_string()],
    };

    let server = ApiServer::new(api_config, Arc::new(analyzer));
    server
        .serve_with_shutdown(wait_for_shutdown())
        .await
        .context("API server error")?;

    info!("Faultline stopped");
    Ok(())
}

/// Initialize logging based on CLI arguments
fn init_logging(cli: &Cli) -> Result<()> {
    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .context("Invalid log level")?;

    if cli.log_json {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true),
            )
            .with(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(log_level.into()),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_line_number(true),
            )
            .with(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(log_level.into()),
            )
            .init();
    }

    info!("Logging initialized at level: {}", log_level);
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or CTRL+C)
async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}
