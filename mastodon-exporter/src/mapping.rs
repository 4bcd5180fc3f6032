//! Mapping from Mastodon REST documents to metric samples.
//!
//! Each upstream endpoint is described by an [`EndpointSpec`]: where to
//! fetch it and how to turn the returned JSON into samples. The built-in
//! tables for the supported API variants live in [`ApiVariant::endpoints`];
//! a configuration file may replace them entirely.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use crate::collector::MetricSample;
use crate::error::{ExtractError, ScrapeError};
use crate::extract;
use crate::fetch::Fetcher;

/// Path of the v1 instance document.
pub const INSTANCE_V1_API: &str = "/api/v1/instance";
/// Path of the v2 instance document.
pub const INSTANCE_V2_API: &str = "/api/v2/instance";
/// Path of the known peers list.
pub const PEERS_API: &str = "/api/v1/instance/peers";
/// Path of the weekly activity list.
pub const ACTIVITY_API: &str = "/api/v1/instance/activity";

/// Which shape of the Mastodon API the target server exposes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiVariant {
    /// v1 instance statistics plus v2 usage.
    #[default]
    V1V2,
    /// v2 instance document only; no per-instance statistics.
    V2Only,
}

impl ApiVariant {
    /// The endpoint table for this variant, in scrape order.
    pub fn endpoints(&self) -> Vec<EndpointSpec> {
        match self {
            Self::V1V2 => vec![
                instance_profile(),
                instance_usage(),
                peers(),
                activity(),
            ],
            Self::V2Only => vec![instance_usage(), peers(), activity()],
        }
    }
}

/// One upstream endpoint and the metrics derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSpec {
    /// Short name used in logs.
    pub name: String,
    /// Path appended to the target base URL.
    pub path: String,
    /// How the document is turned into samples.
    pub mapping: Mapping,
}

/// How to derive samples from a JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mapping {
    /// Numeric fields read from an object document.
    Fields { fields: Vec<FieldMapping> },
    /// The document is an array; its length is the value.
    ArrayLength {
        metric: String,
        #[serde(default)]
        help: String,
    },
    /// The document is an array of objects, one sample per entry and value,
    /// labelled with a string field of the entry.
    Weekly {
        label: String,
        label_field: String,
        values: Vec<EntryValue>,
    },
}

/// A numeric field at a key path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub metric: String,
    #[serde(default)]
    pub help: String,
    pub path: Vec<String>,
}

/// A per-entry counter of a [`Mapping::Weekly`] document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryValue {
    pub field: String,
    pub metric: String,
    #[serde(default)]
    pub help: String,
}

/// Build a full metric name: `{prefix}_{metric}`.
pub fn metric_name(prefix: &str, metric: &str) -> String {
    if prefix.is_empty() {
        metric.to_string()
    } else {
        format!("{}_{}", prefix, metric)
    }
}

impl Mapping {
    /// Unprefixed names of every metric this mapping emits.
    pub fn metric_names(&self) -> Vec<&str> {
        match self {
            Self::Fields { fields } => fields.iter().map(|f| f.metric.as_str()).collect(),
            Self::ArrayLength { metric, .. } => vec![metric.as_str()],
            Self::Weekly { values, .. } => values.iter().map(|v| v.metric.as_str()).collect(),
        }
    }

    /// Map a parsed document to samples.
    ///
    /// Either every sample of the mapping is produced or none is.
    pub fn map(&self, doc: &Value, prefix: &str) -> Result<Vec<MetricSample>, ExtractError> {
        match self {
            Self::Fields { fields } => fields
                .iter()
                .map(|field| -> Result<MetricSample, ExtractError> {
                    let value = extract::extract_number(doc, &field.path)?;
                    Ok(MetricSample::gauge(
                        metric_name(prefix, &field.metric),
                        &field.help,
                        value,
                    ))
                })
                .collect(),

            Self::ArrayLength { metric, help } => {
                let len = extract::extract_array_length::<&str>(doc, &[])?;
                Ok(vec![MetricSample::gauge(
                    metric_name(prefix, metric),
                    help,
                    len as f64,
                )])
            }

            Self::Weekly {
                label,
                label_field,
                values,
            } => {
                let entries = extract::extract_array::<&str>(doc, &[])?;
                let mut samples = Vec::with_capacity(entries.len() * values.len());

                for value in values {
                    let name = metric_name(prefix, &value.metric);
                    let mut series: Vec<MetricSample> = Vec::with_capacity(entries.len());

                    for (index, entry) in entries.iter().enumerate() {
                        let key = extract::extract_string(entry, &[label_field])
                            .map_err(|e| e.in_element(index))?;
                        let count = extract::extract_lenient_count(entry, &[&value.field])
                            .map_err(|e| e.in_element(index))?;

                        let sample =
                            MetricSample::gauge(name.clone(), &value.help, count).with_label(label, key);

                        // Later entries for the same week replace earlier ones.
                        match series.iter_mut().find(|s| s.labels == sample.labels) {
                            Some(existing) => *existing = sample,
                            None => series.push(sample),
                        }
                    }

                    samples.extend(series);
                }

                Ok(samples)
            }
        }
    }
}

impl EndpointSpec {
    /// Fetch this endpoint from `base_url` and map the result.
    pub async fn scrape(
        &self,
        fetcher: &Fetcher,
        base_url: &str,
        prefix: &str,
    ) -> Result<Vec<MetricSample>, ScrapeError> {
        let url = self.url(base_url);
        let body = fetcher.fetch(&url).await?;
        let doc = extract::parse(&body)?;
        let samples = self.mapping.map(&doc, prefix)?;

        trace!(
            endpoint = %self.name,
            samples = samples.len(),
            "Mapped endpoint document"
        );

        Ok(samples)
    }

    /// Full URL of this endpoint under `base_url`.
    pub fn url(&self, base_url: &str) -> String {
        format!("{}{}", base_url, self.path)
    }
}

fn field(metric: &str, help: &str, path: &[&str]) -> FieldMapping {
    FieldMapping {
        metric: metric.to_string(),
        help: help.to_string(),
        path: path.iter().map(|s| s.to_string()).collect(),
    }
}

fn instance_profile() -> EndpointSpec {
    EndpointSpec {
        name: "instance_profile".to_string(),
        path: INSTANCE_V1_API.to_string(),
        mapping: Mapping::Fields {
            fields: vec![
                field("user_count", "number of users", &["stats", "user_count"]),
                field(
                    "status_count",
                    "number of statuses",
                    &["stats", "status_count"],
                ),
                field(
                    "domain_count",
                    "number of domains",
                    &["stats", "domain_count"],
                ),
            ],
        },
    }
}

fn instance_usage() -> EndpointSpec {
    EndpointSpec {
        name: "instance_usage".to_string(),
        path: INSTANCE_V2_API.to_string(),
        mapping: Mapping::Fields {
            fields: vec![field(
                "monthly_active_users",
                "how many users were active this month",
                &["usage", "users", "active_month"],
            )],
        },
    }
}

fn peers() -> EndpointSpec {
    EndpointSpec {
        name: "peers".to_string(),
        path: PEERS_API.to_string(),
        mapping: Mapping::ArrayLength {
            metric: "num_peers".to_string(),
            help: "the number of instances this instance is aware of".to_string(),
        },
    }
}

fn activity() -> EndpointSpec {
    EndpointSpec {
        name: "activity".to_string(),
        path: ACTIVITY_API.to_string(),
        mapping: Mapping::Weekly {
            label: "week".to_string(),
            label_field: "week".to_string(),
            values: vec![
                EntryValue {
                    field: "statuses".to_string(),
                    metric: "num_statuses".to_string(),
                    help: "the number of statuses that have been posted in the given week"
                        .to_string(),
                },
                EntryValue {
                    field: "logins".to_string(),
                    metric: "num_logins".to_string(),
                    help: "the number of logins the instance has seen in the given week"
                        .to_string(),
                },
            ],
        },
    }
}
