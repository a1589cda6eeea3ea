//! Traits describing source adapter capabilities and the raw rows they produce.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Error as ReqwestError;
use serde::Serialize;

use crate::model::SourceMeta;

#[derive(thiserror::Error, Debug)]
/// Reasons a source could not produce any data for a run.
pub enum FetchError {
    /// Network layer failed or the source answered with an error status.
    #[error("Network error: {0}")]
    Network(#[source] ReqwestError),
    /// The response could not be read as a known document shape.
    #[error("Parse error: {0}")]
    Parse(String),
    /// The source did not answer within the allotted time.
    #[error("Source timed out")]
    Timeout,
}

impl FetchError {
    /// Coarse classification used in run reports.
    #[must_use]
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Network(_) => FetchErrorKind::Network,
            FetchError::Parse(_) => FetchErrorKind::Parse,
            FetchError::Timeout => FetchErrorKind::Timeout,
        }
    }
}

impl From<ReqwestError> for FetchError {
    fn from(err: ReqwestError) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_decode() {
            FetchError::Parse(err.to_string())
        } else {
            FetchError::Network(err)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
/// Classification of a [`FetchError`].
pub enum FetchErrorKind {
    /// Connection or HTTP status failure.
    Network,
    /// Unreadable document.
    Parse,
    /// Deadline exceeded.
    Timeout,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FetchErrorKind::Network => "network",
            FetchErrorKind::Parse => "parse",
            FetchErrorKind::Timeout => "timeout",
        };
        formatter.write_str(label)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
/// One loosely-typed row as extracted from a source.
pub struct RawRow {
    /// City spelling exactly as the source printed it.
    pub city: String,
    /// Metric name to value, names not yet checked against any metric set.
    pub values: BTreeMap<String, f64>,
}

impl RawRow {
    /// Start a row for the given city.
    #[must_use]
    pub fn new<S: Into<String>>(city: S) -> Self {
        Self {
            city: city.into(),
            values: BTreeMap::new(),
        }
    }

    /// Add a metric value.
    #[must_use]
    pub fn with<K: Into<String>>(mut self, metric: K, value: f64) -> Self {
        self.values.insert(metric.into(), value);
        self
    }
}

#[derive(Debug, Clone)]
/// Everything one source fetch produced.
pub struct RawExtraction {
    /// Provenance label copied onto every record.
    pub source_name: String,
    /// Endpoint the rows were read from.
    pub origin: String,
    /// When the fetch happened.
    pub fetched_at: DateTime<Utc>,
    /// Extracted rows; may be empty.
    pub rows: Vec<RawRow>,
}

#[async_trait]
/// Trait for source-specific fetch and extraction backends.
pub trait SourcePort: Send + Sync {
    /// Metadata describing this source.
    fn source(&self) -> &SourceMeta;

    /// Fetch the source and extract its rows.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] when the source produced no usable response at all.
    async fn fetch(&self) -> Result<RawExtraction, FetchError>;
}
