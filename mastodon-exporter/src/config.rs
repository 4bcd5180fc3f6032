//! Configuration for the Mastodon exporter.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;

pub use crate::error::ConfigError;
use crate::exposition::{is_valid_label_name, is_valid_metric_name};
use crate::http::HEALTH_PATH;
use crate::mapping::{ApiVariant, EndpointSpec, Mapping, metric_name};

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Monitored Mastodon server.
    #[serde(default)]
    pub target: TargetConfig,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// The Mastodon server being monitored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Server domain (default: "mastodon.example").
    ///
    /// A bare host is reached over `https://`. A value that already carries a
    /// scheme is used as the base URL unchanged.
    #[serde(default = "default_domain")]
    pub domain: String,

    /// Shape of the API exposed by the server.
    #[serde(default)]
    pub api_variant: ApiVariant,

    /// Endpoint table replacing the one of `api_variant`.
    #[serde(default)]
    pub endpoints: Option<Vec<EndpointSpec>>,

    /// Skip TLS certificate verification (default: true).
    #[serde(default = "default_accept_invalid_certs")]
    pub accept_invalid_certs: bool,

    /// Timeout for each upstream request (default: none).
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    /// Deadline for a whole scrape (default: none).
    #[serde(default)]
    pub scrape_timeout_secs: Option<u64>,

    /// Treat non-2xx upstream responses as fetch errors (default: true).
    #[serde(default = "default_require_success_status")]
    pub require_success_status: bool,
}

fn default_domain() -> String {
    "mastodon.example".to_string()
}

fn default_accept_invalid_certs() -> bool {
    true
}

fn default_require_success_status() -> bool {
    true
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            api_variant: ApiVariant::default(),
            endpoints: None,
            accept_invalid_certs: default_accept_invalid_certs(),
            request_timeout_secs: None,
            scrape_timeout_secs: None,
            require_success_status: default_require_success_status(),
        }
    }
}

impl TargetConfig {
    /// Base URL every endpoint path is appended to.
    pub fn base_url(&self) -> String {
        let domain = self.domain.trim().trim_end_matches('/');
        if domain.contains("://") {
            domain.to_string()
        } else {
            format!("https://{}", domain)
        }
    }

    /// The endpoint table in effect.
    pub fn endpoint_table(&self) -> Vec<EndpointSpec> {
        match &self.endpoints {
            Some(endpoints) => endpoints.clone(),
            None => self.api_variant.endpoints(),
        }
    }
}

/// Prometheus HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Address to listen on (default: "0.0.0.0:9876").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,

    /// Metric name prefix (default: "mastodon").
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_listen() -> String {
    "0.0.0.0:9876".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

fn default_prefix() -> String {
    "mastodon".to_string()
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            prefix: default_prefix(),
        }
    }
}

impl PrometheusConfig {
    /// Replace the port of the listen address, keeping its host.
    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        let mut addr: SocketAddr = self.listen.parse().map_err(|_| {
            ConfigError::Validation(format!("Invalid listen address: {}", self.listen))
        })?;
        addr.set_port(port);
        self.listen = addr.to_string();
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    ///
    /// The result is not validated, so command-line overrides can still be
    /// applied; call [`ExporterConfig::validate`] afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(json5::from_str(&content)?)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.domain.trim().is_empty() {
            return Err(ConfigError::Validation(
                "target domain must not be empty".to_string(),
            ));
        }

        if self.target.request_timeout_secs == Some(0) {
            return Err(ConfigError::Validation(
                "request_timeout_secs must be > 0".to_string(),
            ));
        }

        if self.target.scrape_timeout_secs == Some(0) {
            return Err(ConfigError::Validation(
                "scrape_timeout_secs must be > 0".to_string(),
            ));
        }

        // Validate listen address format
        if self
            .prometheus
            .listen
            .parse::<SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.prometheus.listen
            )));
        }

        // Validate path starts with /
        if !self.prometheus.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        if self.prometheus.path == HEALTH_PATH {
            return Err(ConfigError::Validation(format!(
                "Metrics path must not be {}",
                HEALTH_PATH
            )));
        }

        // Route parameters would turn the metrics route into a pattern
        if self
            .prometheus
            .path
            .split('/')
            .any(|segment| segment.starts_with(':') || segment.starts_with('*'))
        {
            return Err(ConfigError::Validation(format!(
                "Metrics path must not contain ':' or '*' segments: {}",
                self.prometheus.path
            )));
        }

        if !self.prometheus.prefix.is_empty() && !is_valid_metric_name(&self.prometheus.prefix) {
            return Err(ConfigError::Validation(format!(
                "Invalid metric prefix: {}",
                self.prometheus.prefix
            )));
        }

        self.validate_endpoints()
    }

    fn validate_endpoints(&self) -> Result<(), ConfigError> {
        let endpoints = self.target.endpoint_table();
        if endpoints.is_empty() {
            return Err(ConfigError::Validation(
                "endpoint table must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        seen.insert(crate::collector::UP_METRIC);

        for endpoint in &endpoints {
            if !endpoint.path.starts_with('/') {
                return Err(ConfigError::Validation(format!(
                    "Endpoint '{}' path must start with /",
                    endpoint.name
                )));
            }

            if let Mapping::Weekly { label, .. } = &endpoint.mapping {
                if !is_valid_label_name(label) {
                    return Err(ConfigError::Validation(format!(
                        "Endpoint '{}' has invalid label name: {}",
                        endpoint.name, label
                    )));
                }
            }

            for metric in endpoint.mapping.metric_names() {
                let full = metric_name(&self.prometheus.prefix, metric);
                if !is_valid_metric_name(&full) {
                    return Err(ConfigError::Validation(format!(
                        "Endpoint '{}' has invalid metric name: {}",
                        endpoint.name, full
                    )));
                }
                if !seen.insert(metric) {
                    return Err(ConfigError::Validation(format!(
                        "Metric '{}' is emitted more than once",
                        full
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_minimal_config() {
        let config = ExporterConfig::parse("{}").unwrap();

        assert_eq!(config.target.domain, "mastodon.example");
        assert_eq!(config.target.api_variant, ApiVariant::V1V2);
        assert!(config.target.accept_invalid_certs);
        assert!(config.target.require_success_status);
        assert_eq!(config.target.request_timeout_secs, None);
        assert_eq!(config.target.scrape_timeout_secs, None);
        assert_eq!(config.prometheus.listen, "0.0.0.0:9876");
        assert_eq!(config.prometheus.path, "/metrics");
        assert_eq!(config.prometheus.prefix, "mastodon");
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            target: {
                domain: "social.example.org",
                api_variant: "v2_only",
                accept_invalid_certs: false,
                request_timeout_secs: 10,
                scrape_timeout_secs: 30,
                require_success_status: false,
            },
            prometheus: {
                listen: "127.0.0.1:9100",
                path: "/prometheus/metrics",
                prefix: "fedi"
            },
            logging: {
                level: "debug",
                format: "json"
            }
        }"#;

        let config = ExporterConfig::parse(json).unwrap();

        assert_eq!(config.target.domain, "social.example.org");
        assert_eq!(config.target.api_variant, ApiVariant::V2Only);
        assert!(!config.target.accept_invalid_certs);
        assert!(!config.target.require_success_status);
        assert_eq!(config.target.request_timeout_secs, Some(10));
        assert_eq!(config.target.scrape_timeout_secs, Some(30));
        assert_eq!(config.prometheus.listen, "127.0.0.1:9100");
        assert_eq!(config.prometheus.path, "/prometheus/metrics");
        assert_eq!(config.prometheus.prefix, "fedi");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_parse_custom_endpoint_table() {
        let json = r#"{
            target: {
                endpoints: [
                    {
                        name: "usage",
                        path: "/api/v2/instance",
                        mapping: {
                            kind: "fields",
                            fields: [
                                { metric: "monthly_active_users", path: ["usage", "users", "active_month"] }
                            ]
                        }
                    },
                    {
                        name: "activity",
                        path: "/api/v1/instance/activity",
                        mapping: {
                            kind: "weekly",
                            label: "week",
                            label_field: "week",
                            values: [{ field: "registrations", metric: "num_registrations" }]
                        }
                    }
                ]
            }
        }"#;

        let config = ExporterConfig::parse(json).unwrap();
        let table = config.target.endpoint_table();

        assert_eq!(table.len(), 2);
        assert_eq!(table[0].name, "usage");
        assert_eq!(table[1].mapping.metric_names(), vec!["num_registrations"]);
    }

    #[test]
    fn test_base_url() {
        let mut target = TargetConfig::default();
        assert_eq!(target.base_url(), "https://mastodon.example");

        target.domain = "https://social.example/".to_string();
        assert_eq!(target.base_url(), "https://social.example");

        target.domain = "http://127.0.0.1:3000".to_string();
        assert_eq!(target.base_url(), "http://127.0.0.1:3000");
    }

    #[test]
    fn test_set_port() {
        let mut prometheus = PrometheusConfig::default();
        prometheus.set_port(9100).unwrap();
        assert_eq!(prometheus.listen, "0.0.0.0:9100");

        prometheus.listen = "bogus".to_string();
        assert!(prometheus.set_port(9100).is_err());
    }

    #[test]
    fn test_validate_invalid_listen() {
        let result = ExporterConfig::parse(r#"{ prometheus: { listen: "not-an-address" } }"#);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid listen address")
        );
    }

    #[test]
    fn test_validate_invalid_path() {
        let result = ExporterConfig::parse(r#"{ prometheus: { path: "no-leading-slash" } }"#);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("must start with /")
        );
    }

    #[test]
    fn test_validate_path_clashes_with_health() {
        let result = ExporterConfig::parse(r#"{ prometheus: { path: "/health" } }"#);
        assert!(result.unwrap_err().to_string().contains("must not be /health"));
    }

    #[test]
    fn test_validate_path_route_parameters() {
        for path in ["/:x", "/metrics/*rest", "/a/:b/c"] {
            let json = format!(r#"{{ prometheus: {{ path: "{}" }} }}"#, path);
            let result = ExporterConfig::parse(&json);
            assert!(
                result
                    .unwrap_err()
                    .to_string()
                    .contains("':' or '*' segments"),
                "path {} should be rejected",
                path
            );
        }

        // A colon inside a segment is a literal
        assert!(ExporterConfig::parse(r#"{ prometheus: { path: "/a:b" } }"#).is_ok());
    }

    #[test]
    fn test_validate_zero_timeouts() {
        assert!(ExporterConfig::parse(r#"{ target: { request_timeout_secs: 0 } }"#).is_err());
        assert!(ExporterConfig::parse(r#"{ target: { scrape_timeout_secs: 0 } }"#).is_err());
    }

    #[test]
    fn test_validate_empty_domain() {
        assert!(ExporterConfig::parse(r#"{ target: { domain: "  " } }"#).is_err());
    }

    #[test]
    fn test_validate_bad_prefix() {
        assert!(ExporterConfig::parse(r#"{ prometheus: { prefix: "my-app" } }"#).is_err());
    }

    #[test]
    fn test_validate_empty_endpoint_table() {
        let result = ExporterConfig::parse(r#"{ target: { endpoints: [] } }"#);
        assert!(result.unwrap_err().to_string().contains("must not be empty"));
    }

    #[test]
    fn test_validate_duplicate_metric() {
        let json = r#"{
            target: {
                endpoints: [
                    { name: "a", path: "/a", mapping: { kind: "array_length", metric: "num_peers" } },
                    { name: "b", path: "/b", mapping: { kind: "array_length", metric: "num_peers" } }
                ]
            }
        }"#;
        let result = ExporterConfig::parse(json);
        assert!(result.unwrap_err().to_string().contains("more than once"));
    }

    #[test]
    fn test_validate_metric_named_up() {
        let json = r#"{
            target: {
                endpoints: [
                    { name: "a", path: "/a", mapping: { kind: "array_length", metric: "up" } }
                ]
            }
        }"#;
        assert!(ExporterConfig::parse(json).is_err());
    }

    #[test]
    fn test_validate_endpoint_path() {
        let json = r#"{
            target: {
                endpoints: [
                    { name: "a", path: "api/v1/instance/peers", mapping: { kind: "array_length", metric: "num_peers" } }
                ]
            }
        }"#;
        assert!(ExporterConfig::parse(json).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ target: {{ domain: "file.example" }} }}"#).unwrap();

        let config = ExporterConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.target.domain, "file.example");
    }

    #[test]
    fn test_load_from_file_defers_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ prometheus: {{ path: "metrics" }} }}"#).unwrap();

        let mut config = ExporterConfig::load_from_file(file.path()).unwrap();
        assert!(config.validate().is_err());

        config.prometheus.path = "/metrics".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file() {
        let err = ExporterConfig::load_from_file("/nonexistent/mastodon-exporter.json5").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
