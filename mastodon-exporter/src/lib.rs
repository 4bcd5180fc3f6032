//! Prometheus exporter for Mastodon instance statistics.
//!
//! On every scrape of the metrics endpoint the exporter fetches the public
//! instance, peers and activity documents of one Mastodon server, extracts
//! a fixed set of gauges and renders them in the Prometheus text format.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ Mastodon server │<────│    Collector    │<────│   HTTP Server   │
//! │  (/api/v1, v2)  │     │ (endpoint table)│     │   (/metrics)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! mastodon-exporter --domain mastodon.social --port 9876
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod collector;
pub mod config;
pub mod error;
pub mod exposition;
pub mod extract;
pub mod fetch;
pub mod http;
pub mod mapping;

pub use collector::{Collector, MetricSample, ScrapeOutcome, ScrapeResult, SharedCollector};
pub use config::{ExporterConfig, LogFormat, LoggingConfig};
pub use error::{ConfigError, ExtractError, FetchError, ParseError, ScrapeError};
pub use fetch::Fetcher;
pub use http::HttpServer;
pub use mapping::{ApiVariant, EndpointSpec, Mapping};

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ConfigError> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| {
                    ConfigError::Validation(format!("Failed to initialize tracing: {}", e))
                })?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| {
                    ConfigError::Validation(format!("Failed to initialize tracing: {}", e))
                })?;
        }
    }

    Ok(())
}
