//! Domain data structures for cities, sources, pollution records, and snapshots.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Major Indian cities covered by the bundled reference profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cities {
    /// Mumbai, Maharashtra.
    Mumbai,
    /// Delhi (National Capital Territory).
    Delhi,
    /// Bangalore, Karnataka.
    Bangalore,
    /// Hyderabad, Telangana.
    Hyderabad,
    /// Chennai, Tamil Nadu.
    Chennai,
    /// Kolkata, West Bengal.
    Kolkata,
    /// Pune, Maharashtra.
    Pune,
    /// Ahmedabad, Gujarat.
    Ahmedabad,
    /// Jaipur, Rajasthan.
    Jaipur,
    /// Lucknow, Uttar Pradesh.
    Lucknow,
}

impl Cities {
    /// Every built-in city in reporting order.
    pub const ALL: [Cities; 10] = [
        Cities::Mumbai,
        Cities::Delhi,
        Cities::Bangalore,
        Cities::Hyderabad,
        Cities::Chennai,
        Cities::Kolkata,
        Cities::Pune,
        Cities::Ahmedabad,
        Cities::Jaipur,
        Cities::Lucknow,
    ];

    /// Alternate and historic spellings seen in published bulletins.
    #[must_use]
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Cities::Mumbai => &["Bombay", "Greater Mumbai"],
            Cities::Delhi => &["New Delhi", "NCT of Delhi", "Dilli"],
            Cities::Bangalore => &["Bengaluru"],
            Cities::Hyderabad => &["Greater Hyderabad"],
            Cities::Chennai => &["Madras"],
            Cities::Kolkata => &["Calcutta"],
            Cities::Pune => &["Poona"],
            Cities::Ahmedabad => &["Amdavad", "Ahmadabad"],
            Cities::Jaipur => &[],
            Cities::Lucknow => &["Lakhnau"],
        }
    }
}

impl fmt::Display for Cities {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Cities::Mumbai => "Mumbai",
            Cities::Delhi => "Delhi",
            Cities::Bangalore => "Bangalore",
            Cities::Hyderabad => "Hyderabad",
            Cities::Chennai => "Chennai",
            Cities::Kolkata => "Kolkata",
            Cities::Pune => "Pune",
            Cities::Ahmedabad => "Ahmedabad",
            Cities::Jaipur => "Jaipur",
            Cities::Lucknow => "Lucknow",
        };
        write!(formatter, "{name}")
    }
}

impl From<Cities> for CityName {
    fn from(city: Cities) -> Self {
        CityName(city.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
/// City name as stored on a record.
pub struct CityName(pub String);

impl CityName {
    /// Case- and whitespace-insensitive lookup key for a city spelling.
    #[must_use]
    pub fn key_for(raw: &str) -> String {
        raw.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    /// Lookup key of this name.
    #[must_use]
    pub fn key(&self) -> String {
        Self::key_for(&self.0)
    }

    /// Borrow the stored spelling.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CityName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Pollution domains tracked by EcoMonitor.
pub enum PollutionType {
    /// Surface water quality.
    Water,
    /// Soil health and contamination.
    Soil,
    /// Plastic waste generation and management.
    Plastic,
}

impl PollutionType {
    /// All pollution types in their published order.
    pub const ALL: [PollutionType; 3] = [
        PollutionType::Water,
        PollutionType::Soil,
        PollutionType::Plastic,
    ];

    /// Lowercase wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PollutionType::Water => "water",
            PollutionType::Soil => "soil",
            PollutionType::Plastic => "plastic",
        }
    }
}

impl fmt::Display for PollutionType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown pollution type: {0}")]
/// Returned when a string does not name a pollution type.
pub struct UnknownPollutionType(pub String);

impl FromStr for PollutionType {
    type Err = UnknownPollutionType;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim();
        PollutionType::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownPollutionType(raw.to_owned()))
    }
}

/// Metric name to measured value, ordered by name.
pub type Metrics = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
/// Identifier for a registered data source.
pub struct SourceId(pub String);

impl fmt::Display for SourceId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Static description of a data source.
pub struct SourceMeta {
    /// Unique identifier.
    pub id: SourceId,
    /// Human-friendly name, stored as record provenance.
    pub name: String,
    /// Domain every row of this source belongs to.
    pub pollution_type: PollutionType,
    /// Endpoint or document the source reads from.
    pub origin: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Canonical measurement record served by the read API.
pub struct PollutionRecord {
    /// Canonical city spelling.
    pub city: CityName,
    /// Domain of the metrics.
    pub pollution_type: PollutionType,
    /// Measured values, restricted to the domain's metric set.
    pub metrics: Metrics,
    /// Composite index derived from `metrics`.
    pub composite_index: f64,
    /// Source the measurements came from.
    pub source_name: String,
    /// When the source was fetched.
    pub collected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
/// Freshness of the served snapshot.
pub enum SnapshotStatus {
    /// No run has committed data yet.
    Uninitialized,
    /// Produced by the most recent run.
    Fresh,
    /// Kept from an earlier run because the latest one produced nothing.
    StaleFallback,
}

impl fmt::Display for SnapshotStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SnapshotStatus::Uninitialized => "uninitialized",
            SnapshotStatus::Fresh => "fresh",
            SnapshotStatus::StaleFallback => "stale-fallback",
        };
        formatter.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Immutable, versioned collection of committed records.
pub struct Snapshot {
    /// Monotonic commit counter, `0` before the first commit.
    pub version: u64,
    /// Commit time, `None` before the first commit.
    pub generated_at: Option<DateTime<Utc>>,
    /// Freshness marker.
    pub status: SnapshotStatus,
    /// Committed records.
    pub records: Vec<PollutionRecord>,
}

impl Snapshot {
    /// Placeholder served before any run has succeeded.
    #[must_use]
    pub fn uninitialized() -> Self {
        Self {
            version: 0,
            generated_at: None,
            status: SnapshotStatus::Uninitialized,
            records: Vec::new(),
        }
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::uninitialized()
    }
}
