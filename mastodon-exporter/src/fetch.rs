//! HTTP fetcher for upstream Mastodon documents.

use std::time::Duration;

use reqwest::Client;
use tracing::trace;

use crate::config::TargetConfig;
use crate::error::{ConfigError, FetchError};

/// Issues single, unauthenticated GET requests against the target server.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    require_success_status: bool,
}

impl Fetcher {
    /// Build a fetcher and its HTTP client from the target configuration.
    ///
    /// Certificate verification is skipped when `accept_invalid_certs` is set,
    /// since the monitored instance is known and may serve an incomplete chain.
    pub fn new(config: &TargetConfig) -> Result<Self, ConfigError> {
        let mut builder = Client::builder().danger_accept_invalid_certs(config.accept_invalid_certs);

        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self::with_client(
            builder.build()?,
            config.require_success_status,
        ))
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client, require_success_status: bool) -> Self {
        Self {
            client,
            require_success_status,
        }
    }

    /// GET `url` and return the full response body.
    ///
    /// No retries. Non-2xx responses are rejected with [`FetchError::Status`]
    /// unless status checking is disabled, in which case the body is returned
    /// as-is.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        trace!(%url, "Fetching");

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                }
            } else {
                FetchError::Request {
                    url: url.to_string(),
                    source: e,
                }
            }
        })?;

        let status = response.status();
        if self.require_success_status && !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                }
            } else {
                FetchError::Body {
                    url: url.to_string(),
                    source: e,
                }
            }
        })?;

        trace!(%url, status = status.as_u16(), bytes = body.len(), "Fetched");

        Ok(body.to_vec())
    }
}
