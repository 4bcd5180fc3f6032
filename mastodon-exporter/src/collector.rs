//! Scrape orchestration.
//!
//! A [`Collector`] runs the endpoint table in order on every scrape. Samples
//! from each endpoint are kept only when the whole endpoint succeeded; the
//! first failure stops the sequence. The `up` sample is always emitted last.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::{ExporterConfig, TargetConfig};
use crate::error::{ConfigError, FetchError, ScrapeError};
use crate::fetch::Fetcher;
use crate::mapping::{EndpointSpec, metric_name};

/// Unprefixed name of the scrape health gauge.
pub const UP_METRIC: &str = "up";

const UP_HELP: &str = "was the last query successful";

/// A single gauge sample.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    /// Full metric name, including the prefix.
    pub name: String,
    /// Help text for the metric family.
    pub help: String,
    /// Label pairs. Empty, or a single `week` label for activity metrics.
    pub labels: Vec<(String, String)>,
    pub value: f64,
}

impl MetricSample {
    /// Create an unlabelled gauge sample.
    pub fn gauge(name: impl Into<String>, help: &str, value: f64) -> Self {
        Self {
            name: name.into(),
            help: help.to_string(),
            labels: Vec::new(),
            value,
        }
    }

    /// Add a label.
    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.push((key.to_string(), value.to_string()));
        self
    }
}

/// How a scrape ended.
#[derive(Debug)]
pub enum ScrapeOutcome {
    /// Every endpoint was fetched and mapped.
    Healthy,
    /// The named endpoint failed and the remaining ones were skipped.
    Unhealthy { endpoint: String, error: ScrapeError },
}

/// Samples of one scrape, ending with the `up` gauge.
#[derive(Debug)]
pub struct ScrapeResult {
    pub samples: Vec<MetricSample>,
    pub outcome: ScrapeOutcome,
}

impl ScrapeResult {
    pub fn is_up(&self) -> bool {
        matches!(self.outcome, ScrapeOutcome::Healthy)
    }

    /// Value of the first unlabelled sample named `name`.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.samples
            .iter()
            .find(|s| s.name == name && s.labels.is_empty())
            .map(|s| s.value)
    }

    /// Value of the sample named `name` carrying `key="label"`.
    pub fn labelled_value(&self, name: &str, key: &str, label: &str) -> Option<f64> {
        self.samples
            .iter()
            .find(|s| s.name == name && s.labels.iter().any(|(k, v)| k == key && v == label))
            .map(|s| s.value)
    }
}

/// Runs the endpoint table against one target server.
///
/// Holds no mutable state, so concurrent scrapes through a shared reference
/// are independent.
#[derive(Debug, Clone)]
pub struct Collector {
    fetcher: Fetcher,
    base_url: String,
    endpoints: Vec<EndpointSpec>,
    prefix: String,
    scrape_timeout: Option<Duration>,
}

/// Create a shareable collector handle.
pub type SharedCollector = Arc<Collector>;

impl Collector {
    /// Create a collector for `target`, naming metrics `{prefix}_*`.
    pub fn new(fetcher: Fetcher, target: &TargetConfig, prefix: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: target.base_url(),
            endpoints: target.endpoint_table(),
            prefix: prefix.into(),
            scrape_timeout: target.scrape_timeout_secs.map(Duration::from_secs),
        }
    }

    /// Build the collector and its HTTP client from the full configuration.
    pub fn from_config(config: &ExporterConfig) -> Result<Self, ConfigError> {
        let fetcher = Fetcher::new(&config.target)?;
        Ok(Self::new(
            fetcher,
            &config.target,
            config.prometheus.prefix.clone(),
        ))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoints(&self) -> &[EndpointSpec] {
        &self.endpoints
    }

    /// Run one scrape, bounded by the configured scrape timeout if any.
    pub async fn collect(&self) -> ScrapeResult {
        let deadline = self.scrape_timeout.map(|t| Instant::now() + t);
        self.collect_until(deadline).await
    }

    /// Run one scrape that gives up once `deadline` passes.
    pub async fn collect_until(&self, deadline: Option<Instant>) -> ScrapeResult {
        let started = Instant::now();
        let mut samples = Vec::new();

        for endpoint in &self.endpoints {
            let scrape = endpoint.scrape(&self.fetcher, &self.base_url, &self.prefix);

            let result = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, scrape)
                    .await
                    .unwrap_or_else(|_| {
                        Err(FetchError::Timeout {
                            url: endpoint.url(&self.base_url),
                        }
                        .into())
                    }),
                None => scrape.await,
            };

            match result {
                Ok(endpoint_samples) => samples.extend(endpoint_samples),
                Err(error) => {
                    warn!(
                        endpoint = %endpoint.name,
                        url = %endpoint.url(&self.base_url),
                        error = %error,
                        "Scrape failed"
                    );
                    samples.push(self.up(false));
                    return ScrapeResult {
                        samples,
                        outcome: ScrapeOutcome::Unhealthy {
                            endpoint: endpoint.name.clone(),
                            error,
                        },
                    };
                }
            }
        }

        samples.push(self.up(true));

        debug!(
            samples = samples.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Collected metrics successfully"
        );

        ScrapeResult {
            samples,
            outcome: ScrapeOutcome::Healthy,
        }
    }

    fn up(&self, healthy: bool) -> MetricSample {
        MetricSample::gauge(
            metric_name(&self.prefix, UP_METRIC),
            UP_HELP,
            if healthy { 1.0 } else { 0.0 },
        )
    }
}
