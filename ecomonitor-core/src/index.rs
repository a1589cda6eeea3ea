//! Composite index calculation driven by a configurable weighting table.
//!
//! Every index follows the same steps: each metric is mapped through its
//! curve onto `0..=100`, the sub-scores are averaged with the table weights,
//! and the result is clamped and rounded to one decimal.
//!
//! The default table is a documented placeholder seeded from CPCB, ICAR and
//! CPCB/CSE guideline ranges; deployments override it with
//! [`IndexTable::from_json_file`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::{Metrics, PollutionType};
use crate::normalize::RecordCandidate;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
/// Monotonic mapping from a raw measurement onto a `0..=100` sub-score.
pub enum Curve {
    /// Linear between `zero_at` (score 0) and `full_at` (score 100).
    ///
    /// `zero_at > full_at` describes a metric where larger values score lower.
    Linear {
        /// Raw value scoring 0.
        zero_at: f64,
        /// Raw value scoring 100.
        full_at: f64,
    },
    /// 100 at `center`, falling to 0 at `center ± span`.
    Closeness {
        /// Ideal value.
        center: f64,
        /// Distance at which the score reaches 0.
        span: f64,
    },
    /// 0 at `center`, rising to 100 at `center ± span`.
    Departure {
        /// Neutral value.
        center: f64,
        /// Distance at which the score reaches 100.
        span: f64,
    },
    /// Observed/threshold ratio, capped at `cap` and scaled so `cap` scores 100.
    Ratio {
        /// Regulatory threshold.
        threshold: f64,
        /// Ratio that scores 100.
        cap: f64,
    },
}

impl Curve {
    /// Sub-score of a raw value.
    #[must_use]
    pub fn score(self, value: f64) -> f64 {
        let fraction = match self {
            Curve::Linear { zero_at, full_at } => (value - zero_at) / (full_at - zero_at),
            Curve::Closeness { center, span } => 1.0 - (value - center).abs() / span,
            Curve::Departure { center, span } => (value - center).abs() / span,
            Curve::Ratio { threshold, cap } => (value / threshold).min(cap) / cap,
        };
        (fraction * 100.0).clamp(0.0, 100.0)
    }

    pub(crate) fn check(self) -> Result<(), String> {
        let (first, second) = match self {
            Curve::Linear { zero_at, full_at } => (zero_at, full_at),
            Curve::Closeness { center, span } | Curve::Departure { center, span } => {
                (center, span)
            }
            Curve::Ratio { threshold, cap } => (threshold, cap),
        };
        if !first.is_finite() || !second.is_finite() {
            return Err("curve parameters must be finite".to_owned());
        }
        let degenerate = match self {
            Curve::Linear { zero_at, full_at } => (zero_at - full_at).abs() < f64::EPSILON,
            Curve::Closeness { span, .. } | Curve::Departure { span, .. } => span <= 0.0,
            Curve::Ratio { threshold, cap } => threshold <= 0.0 || cap <= 0.0,
        };
        if degenerate {
            return Err("curve has a zero-width range".to_owned());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One metric's contribution to an index.
pub struct MetricWeight {
    /// Canonical metric key.
    pub key: String,
    /// Relative weight.
    pub weight: f64,
    /// Whether the index cannot be computed without this metric.
    pub required: bool,
    /// Normalization curve.
    pub curve: Curve,
}

impl MetricWeight {
    fn required(key: &str, weight: f64, curve: Curve) -> Self {
        Self {
            key: key.to_owned(),
            weight,
            required: true,
            curve,
        }
    }

    fn optional(key: &str, weight: f64, curve: Curve) -> Self {
        Self {
            key: key.to_owned(),
            weight,
            required: false,
            curve,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Metric set and weights of one pollution type's index.
pub struct IndexDefinition {
    /// Published index name.
    pub name: String,
    /// Weighted metrics; also the type's fixed metric set.
    pub metrics: Vec<MetricWeight>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Weighting table for all three indices.
pub struct IndexTable {
    /// Water Quality Index, higher is cleaner.
    pub water: IndexDefinition,
    /// Contamination Level Index, higher is more contaminated.
    pub soil: IndexDefinition,
    /// Plastic Pollution Index, higher is worse managed.
    pub plastic: IndexDefinition,
}

impl IndexTable {
    /// Definition for a pollution type.
    #[must_use]
    pub fn definition(&self, pollution_type: PollutionType) -> &IndexDefinition {
        match pollution_type {
            PollutionType::Water => &self.water,
            PollutionType::Soil => &self.soil,
            PollutionType::Plastic => &self.plastic,
        }
    }

    /// Whether `key` belongs to the type's metric set.
    #[must_use]
    pub fn knows_metric(&self, pollution_type: PollutionType, key: &str) -> bool {
        self.definition(pollution_type)
            .metrics
            .iter()
            .any(|metric| metric.key == key)
    }

    /// Metrics the type's index cannot be computed without.
    pub fn required_keys(&self, pollution_type: PollutionType) -> impl Iterator<Item = &str> {
        self.definition(pollution_type)
            .metrics
            .iter()
            .filter(|metric| metric.required)
            .map(|metric| metric.key.as_str())
    }
}

impl Default for IndexTable {
    fn default() -> Self {
        Self {
            water: IndexDefinition {
                name: "Water Quality Index".to_owned(),
                metrics: vec![
                    MetricWeight::required("bod", 0.25, Curve::Linear { zero_at: 30.0, full_at: 3.0 }),
                    MetricWeight::required("cod", 0.15, Curve::Linear { zero_at: 250.0, full_at: 10.0 }),
                    MetricWeight::required(
                        "dissolved_oxygen",
                        0.25,
                        Curve::Linear { zero_at: 2.0, full_at: 8.0 },
                    ),
                    MetricWeight::required("ph", 0.15, Curve::Closeness { center: 7.0, span: 2.0 }),
                    MetricWeight::required(
                        "total_coliform",
                        0.20,
                        Curve::Linear { zero_at: 10_000.0, full_at: 500.0 },
                    ),
                ],
            },
            soil: IndexDefinition {
                name: "Contamination Level Index".to_owned(),
                metrics: vec![
                    MetricWeight::required(
                        "heavy_metals",
                        0.35,
                        Curve::Ratio { threshold: 100.0, cap: 2.0 },
                    ),
                    MetricWeight::required("ph", 0.10, Curve::Departure { center: 7.0, span: 2.0 }),
                    MetricWeight::required("nitrogen", 0.15, Curve::Ratio { threshold: 280.0, cap: 2.0 }),
                    MetricWeight::required("phosphorus", 0.15, Curve::Ratio { threshold: 25.0, cap: 2.0 }),
                    MetricWeight::required("potassium", 0.10, Curve::Ratio { threshold: 280.0, cap: 2.0 }),
                    MetricWeight::optional("lead", 0.10, Curve::Ratio { threshold: 250.0, cap: 2.0 }),
                    MetricWeight::optional("cadmium", 0.10, Curve::Ratio { threshold: 3.0, cap: 2.0 }),
                    MetricWeight::optional("arsenic", 0.10, Curve::Ratio { threshold: 20.0, cap: 2.0 }),
                    MetricWeight::optional("salinity", 0.10, Curve::Ratio { threshold: 4.0, cap: 2.0 }),
                ],
            },
            plastic: IndexDefinition {
                name: "Plastic Pollution Index".to_owned(),
                metrics: vec![
                    MetricWeight::required(
                        "waste_generation",
                        0.35,
                        Curve::Linear { zero_at: 0.0, full_at: 1_500.0 },
                    ),
                    MetricWeight::required(
                        "recycling_rate",
                        0.35,
                        Curve::Linear { zero_at: 100.0, full_at: 0.0 },
                    ),
                    MetricWeight::required("single_use", 0.30, Curve::Linear { zero_at: 0.0, full_at: 100.0 }),
                    MetricWeight::optional("mismanaged", 0.20, Curve::Linear { zero_at: 0.0, full_at: 100.0 }),
                    MetricWeight::optional("microplastics", 0.10, Curve::Linear { zero_at: 0.0, full_at: 50.0 }),
                ],
            },
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{pollution_type} metrics incomplete, missing: {}", .missing.join(", "))]
/// The index cannot be computed because required metrics are absent.
pub struct IncompleteMetricsError {
    /// Type whose index was requested.
    pub pollution_type: PollutionType,
    /// Required metric keys that were absent.
    pub missing: Vec<String>,
}

/// Computes composite indices from a shared weighting table.
#[derive(Debug, Clone)]
pub struct IndexCalculator {
    table: Arc<IndexTable>,
}

impl IndexCalculator {
    /// Create a calculator over the given table.
    #[must_use]
    pub fn new(table: Arc<IndexTable>) -> Self {
        Self { table }
    }

    /// Weighting table in use.
    #[must_use]
    pub fn table(&self) -> &Arc<IndexTable> {
        &self.table
    }

    /// Composite index of a normalized candidate.
    ///
    /// # Errors
    ///
    /// Returns [`IncompleteMetricsError`] for candidates flagged incomplete or
    /// missing any required metric.
    pub fn compute_index(&self, candidate: &RecordCandidate) -> Result<f64, IncompleteMetricsError> {
        if let Some(missing) = candidate.missing_metrics() {
            return Err(IncompleteMetricsError {
                pollution_type: candidate.pollution_type,
                missing: missing.to_vec(),
            });
        }
        self.compute(candidate.pollution_type, &candidate.metrics)
    }

    /// Composite index of a metric set.
    ///
    /// Optional metrics that are absent are left out of the weighted mean.
    ///
    /// # Errors
    ///
    /// Returns [`IncompleteMetricsError`] when a required metric is absent.
    pub fn compute(
        &self,
        pollution_type: PollutionType,
        metrics: &Metrics,
    ) -> Result<f64, IncompleteMetricsError> {
        let definition = self.table.definition(pollution_type);

        let mut missing = Vec::new();
        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;

        for metric in &definition.metrics {
            match metrics.get(&metric.key) {
                Some(value) => {
                    weighted_sum += metric.weight * metric.curve.score(*value);
                    total_weight += metric.weight;
                }
                None if metric.required => missing.push(metric.key.clone()),
                None => {}
            }
        }

        if !missing.is_empty() || total_weight <= 0.0 {
            return Err(IncompleteMetricsError {
                pollution_type,
                missing,
            });
        }

        let index = (weighted_sum / total_weight).clamp(0.0, 100.0);
        Ok((index * 10.0).round() / 10.0)
    }
}
