//! Run settings and loading of index weighting tables.

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use crate::index::IndexTable;
use crate::model::PollutionType;

/// Default deadline for a single source fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(thiserror::Error, Debug)]
/// Errors raised while loading configuration files.
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config: {0}")]
    Io(#[from] io::Error),
    /// The file is not a valid table document.
    #[error("Failed to decode config: {0}")]
    Decode(#[from] serde_json::Error),
    /// The table decoded but is unusable.
    #[error("Invalid index table: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy)]
/// Settings for an aggregation run.
pub struct OrchestratorConfig {
    /// Wall-clock limit for each source fetch.
    pub fetch_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

impl IndexTable {
    /// Load and validate a table from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file is unreadable, malformed, or fails validation.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let table: IndexTable = serde_json::from_str(&raw)?;
        table.validate()?;
        Ok(table)
    }

    /// Check weights and curves of every definition.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending metric.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for pollution_type in PollutionType::ALL {
            let definition = self.definition(pollution_type);
            if self.required_keys(pollution_type).next().is_none() {
                return Err(ConfigError::Invalid(format!(
                    "{} has no required metric",
                    definition.name
                )));
            }
            for metric in &definition.metrics {
                if !metric.weight.is_finite() || metric.weight <= 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "{}: weight of {} must be positive",
                        definition.name, metric.key
                    )));
                }
                metric.curve.check().map_err(|reason| {
                    ConfigError::Invalid(format!("{}: {}: {reason}", definition.name, metric.key))
                })?;
            }
        }
        Ok(())
    }
}
