//! Error types for the Mastodon exporter.
//!
//! Every failure inside a scrape is recoverable: a mapper turns it into a
//! [`ScrapeError`] and the collector turns that into `up=0`.

use thiserror::Error;

/// Kind of a JSON value, used to report shape mismatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl JsonKind {
    /// Classify a JSON value.
    pub fn of(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(_) => Self::Bool,
            serde_json::Value::Number(_) => Self::Number,
            serde_json::Value::String(_) => Self::String,
            serde_json::Value::Array(_) => Self::Array,
            serde_json::Value::Object(_) => Self::Object,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

impl std::fmt::Display for JsonKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport-level failure while fetching an upstream document.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to read response body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {url} timed out")]
    Timeout { url: String },
}

/// The response body is not valid JSON.
#[derive(Debug, Error)]
#[error("Malformed JSON document: {0}")]
pub struct ParseError(#[from] pub serde_json::Error);

/// Well-formed JSON that does not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("Missing field '{path}'")]
    Missing { path: String },

    #[error("Field '{path}' is {found}, expected {expected}")]
    WrongType {
        path: String,
        expected: JsonKind,
        found: JsonKind,
    },
}

impl ExtractError {
    /// Qualify the path with the index of the array element it was read from.
    pub fn in_element(self, index: usize) -> Self {
        match self {
            Self::Missing { path } => Self::Missing {
                path: format!("[{}].{}", index, path),
            },
            Self::WrongType {
                path,
                expected,
                found,
            } => Self::WrongType {
                path: format!("[{}].{}", index, path),
                expected,
                found,
            },
        }
    }
}

/// Any error a mapper can return to the collector.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Extract(#[from] ExtractError),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
