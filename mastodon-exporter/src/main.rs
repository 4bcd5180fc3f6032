//! Prometheus exporter for Mastodon.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use mastodon_exporter::{Collector, ExporterConfig, HttpServer, init_tracing};

/// Prometheus exporter for Mastodon.
#[derive(Parser, Debug)]
#[command(name = "mastodon-exporter")]
#[command(about = "Export Mastodon instance statistics as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// The port on which to listen [default: 9876].
    #[arg(long)]
    port: Option<u16>,

    /// The path on which to expose metrics [default: /metrics].
    #[arg(long)]
    path: Option<String>,

    /// The domain on which Mastodon is running [default: mastodon.example].
    #[arg(long)]
    domain: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(config_path) => ExporterConfig::load_from_file(config_path)?,
        None => ExporterConfig::default(),
    };

    // Override from CLI
    if let Some(port) = args.port {
        config.prometheus.set_port(port)?;
    }
    if let Some(path) = args.path {
        config.prometheus.path = path;
    }
    if let Some(domain) = args.domain {
        config.target.domain = domain;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.validate()?;

    init_tracing(&config.logging)?;

    let collector = Arc::new(Collector::from_config(&config)?);

    let listen_addr: SocketAddr = config
        .prometheus
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    info!(
        domain = %config.target.domain,
        base_url = %collector.base_url(),
        endpoints = collector.endpoints().len(),
        "Exporting from Mastodon instance"
    );
    info!(addr = %listen_addr, path = %config.prometheus.path, "Listening");

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_server = HttpServer::new(collector, listen_addr, config.prometheus.path.clone());
    let mut http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run(shutdown_rx).await {
            error!("HTTP server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
        _ = &mut http_task => {
            anyhow::bail!("HTTP server exited unexpectedly");
        }
    }

    // Signal shutdown
    shutdown_tx.send(true)?;

    // Wait for the server to drain
    let _ = tokio::time::timeout(Duration::from_secs(5), http_task).await;

    info!("Exporter stopped");
    Ok(())
}

async fn terminate() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        std::future::pending::<()>().await;
    }
}
