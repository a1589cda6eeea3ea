//! Maps raw source rows onto flagged record candidates.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::extract::slugify;
use crate::index::IndexTable;
use crate::model::{Cities, CityName, Metrics, PollutionRecord, PollutionType};
use crate::ports::RawExtraction;

/// Canonical spellings for known cities and their variants.
#[derive(Debug, Clone)]
pub struct CityTable {
    entries: HashMap<String, String>,
}

impl CityTable {
    /// Table without any known city.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register a canonical spelling and its aliases.
    #[must_use]
    pub fn with_city(mut self, canonical: &str, aliases: &[&str]) -> Self {
        for spelling in aliases.iter().copied().chain([canonical]) {
            self.entries
                .insert(CityName::key_for(spelling), canonical.to_owned());
        }
        self
    }

    /// Canonical name for a spelling, `None` when the spelling is unknown.
    #[must_use]
    pub fn canonicalize(&self, raw: &str) -> Option<CityName> {
        self.entries
            .get(&CityName::key_for(raw))
            .map(|canonical| CityName(canonical.clone()))
    }
}

impl Default for CityTable {
    fn default() -> Self {
        Cities::ALL.into_iter().fold(Self::empty(), |table, city| {
            table.with_city(&city.to_string(), city.aliases())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Observations attached to a candidate during normalization.
pub enum CandidateFlag {
    /// Required metrics are absent; the candidate cannot be indexed.
    Incomplete {
        /// Absent metric keys.
        missing: Vec<String>,
    },
    /// The city spelling is not in the city table and was kept as printed.
    UnverifiedCity,
}

#[derive(Debug, Clone)]
/// A normalized row that has not been indexed yet.
pub struct RecordCandidate {
    /// Canonical or as-printed city name.
    pub city: CityName,
    /// Domain of the metrics.
    pub pollution_type: PollutionType,
    /// Metrics restricted to the type's metric set.
    pub metrics: Metrics,
    /// Provenance label.
    pub source_name: String,
    /// Fetch time of the source.
    pub collected_at: DateTime<Utc>,
    /// Normalization observations.
    pub flags: Vec<CandidateFlag>,
}

impl RecordCandidate {
    /// Missing required metrics, if the candidate is flagged incomplete.
    #[must_use]
    pub fn missing_metrics(&self) -> Option<&[String]> {
        self.flags.iter().find_map(|flag| match flag {
            CandidateFlag::Incomplete { missing } => Some(missing.as_slice()),
            CandidateFlag::UnverifiedCity => None,
        })
    }

    /// Whether the candidate is flagged incomplete.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        self.missing_metrics().is_some()
    }

    /// Whether the city spelling was not recognized.
    #[must_use]
    pub fn has_unverified_city(&self) -> bool {
        self.flags.contains(&CandidateFlag::UnverifiedCity)
    }

    pub(crate) fn into_record(self, composite_index: f64) -> PollutionRecord {
        PollutionRecord {
            city: self.city,
            pollution_type: self.pollution_type,
            metrics: self.metrics,
            composite_index,
            source_name: self.source_name,
            collected_at: self.collected_at,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Reasons a raw row cannot become a candidate at all.
pub enum ValidationError {
    /// The row has no city.
    #[error("row from {source_name} has no city")]
    EmptyCity {
        /// Source of the row.
        source_name: String,
    },
}

#[derive(Debug, Clone, Default)]
/// Result of normalizing one extraction.
pub struct Normalized {
    /// Candidates, including flagged ones.
    pub candidates: Vec<RecordCandidate>,
    /// Rows that could not become candidates.
    pub rejected: Vec<ValidationError>,
}

/// Maps raw extractions onto candidates using a city table and the metric sets of an index table.
#[derive(Debug, Clone)]
pub struct Normalizer {
    cities: CityTable,
    table: Arc<IndexTable>,
}

impl Normalizer {
    /// Create a normalizer.
    #[must_use]
    pub fn new(cities: CityTable, table: Arc<IndexTable>) -> Self {
        Self { cities, table }
    }

    /// Normalize every row of an extraction as `pollution_type`.
    ///
    /// Metric names are slugged, keys outside the type's metric set and
    /// non-finite values are dropped, and `collected_at` is the extraction's
    /// fetch time, so the same extraction always yields the same candidates.
    #[must_use]
    pub fn normalize(&self, extraction: &RawExtraction, pollution_type: PollutionType) -> Normalized {
        let mut normalized = Normalized::default();

        for row in &extraction.rows {
            let printed = row.city.split_whitespace().collect::<Vec<_>>().join(" ");
            if printed.is_empty() {
                normalized.rejected.push(ValidationError::EmptyCity {
                    source_name: extraction.source_name.clone(),
                });
                continue;
            }

            let mut flags = Vec::new();
            let city = if let Some(canonical) = self.cities.canonicalize(&printed) {
                canonical
            } else {
                debug!(source = %extraction.source_name, city = %printed, "unverified city spelling");
                flags.push(CandidateFlag::UnverifiedCity);
                CityName(title_case(&printed))
            };

            let mut metrics = Metrics::new();
            let mut dropped = BTreeSet::new();
            for (name, value) in &row.values {
                let key = slugify(name);
                if value.is_finite() && self.table.knows_metric(pollution_type, &key) {
                    metrics.insert(key, *value);
                } else {
                    dropped.insert(key);
                }
            }
            if !dropped.is_empty() {
                debug!(source = %extraction.source_name, %city, ?dropped, "dropped metrics outside the metric set");
            }

            let missing: Vec<String> = self
                .table
                .required_keys(pollution_type)
                .filter(|key| !metrics.contains_key(*key))
                .map(str::to_owned)
                .collect();
            if !missing.is_empty() {
                flags.push(CandidateFlag::Incomplete { missing });
            }

            normalized.candidates.push(RecordCandidate {
                city,
                pollution_type,
                metrics,
                source_name: extraction.source_name.clone(),
                collected_at: extraction.fetched_at,
                flags,
            });
        }

        normalized
    }
}

/// Capitalize the first letter of each word and lowercase the rest.
fn title_case(printed: &str) -> String {
    printed
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::ports::RawRow;

    fn extraction(rows: Vec<RawRow>) -> RawExtraction {
        RawExtraction {
            source_name: "CPCB".to_owned(),
            origin: "memory".to_owned(),
            fetched_at: Utc
                .with_ymd_and_hms(2023, 6, 1, 8, 0, 0)
                .single()
                .expect("valid timestamp"),
            rows,
        }
    }

    fn normalizer() -> Normalizer {
        Normalizer::new(CityTable::default(), Arc::new(IndexTable::default()))
    }

    fn complete_water(city: &str) -> RawRow {
        RawRow::new(city)
            .with("BOD", 20.0)
            .with("cod", 120.0)
            .with("dissolved_oxygen", 4.5)
            .with("pH", 7.2)
            .with("total_coliform", 7000.0)
    }

    #[test]
    fn canonicalizes_known_spellings() {
        let normalized = normalizer().normalize(
            &extraction(vec![complete_water("  bombay "), complete_water("BENGALURU")]),
            PollutionType::Water,
        );

        let cities: Vec<_> = normalized
            .candidates
            .iter()
            .map(|candidate| candidate.city.0.as_str())
            .collect();
        assert_eq!(cities, vec!["Mumbai", "Bangalore"]);
        assert!(normalized.candidates.iter().all(|candidate| candidate.flags.is_empty()));
    }

    #[test]
    fn unknown_city_is_kept_and_flagged() {
        let normalized =
            normalizer().normalize(&extraction(vec![complete_water("Bhopal")]), PollutionType::Water);

        let candidate = normalized.candidates.first().expect("candidate");
        assert_eq!(candidate.city.0, "Bhopal");
        assert!(candidate.has_unverified_city());
        assert!(!candidate.is_incomplete());
    }

    #[test]
    fn unknown_city_casing_is_unified_across_sources() {
        let normalizer = normalizer();
        let first = normalizer.normalize(
            &extraction(vec![complete_water("BHOPAL"), complete_water("navi  MUMBAI")]),
            PollutionType::Water,
        );
        let second =
            normalizer.normalize(&extraction(vec![complete_water("bhopal")]), PollutionType::Water);

        let cities: Vec<_> = first
            .candidates
            .iter()
            .chain(&second.candidates)
            .map(|candidate| candidate.city.0.as_str())
            .collect();
        assert_eq!(cities, vec!["Bhopal", "Navi Mumbai", "Bhopal"]);
        assert!(
            first
                .candidates
                .iter()
                .chain(&second.candidates)
                .all(RecordCandidate::has_unverified_city)
        );
    }

    #[test]
    fn neighbouring_cities_are_not_merged() {
        let cities = CityTable::default();
        for neighbour in ["Howrah", "Secunderabad", "Navi Mumbai", "Jeypore"] {
            assert_eq!(cities.canonicalize(neighbour), None, "{neighbour}");
        }
        assert_eq!(cities.canonicalize("calcutta"), Some(CityName("Kolkata".to_owned())));
        assert_eq!(cities.canonicalize("Greater Mumbai"), Some(CityName("Mumbai".to_owned())));
    }

    #[test]
    fn unknown_keys_are_dropped_and_missing_keys_flagged() {
        let row = RawRow::new("Pune")
            .with("bod", 0.0)
            .with("aqi", 85.0)
            .with("cod", f64::NAN);
        let normalized = normalizer().normalize(&extraction(vec![row]), PollutionType::Water);

        let candidate = normalized.candidates.first().expect("candidate");
        assert_eq!(candidate.metrics.keys().collect::<Vec<_>>(), vec!["bod"]);
        assert_eq!(candidate.metrics.get("bod"), Some(&0.0));
        assert_eq!(
            candidate.missing_metrics().expect("incomplete"),
            ["cod", "dissolved_oxygen", "ph", "total_coliform"]
        );
    }

    #[test]
    fn blank_city_rows_are_rejected() {
        let normalized =
            normalizer().normalize(&extraction(vec![complete_water("   ")]), PollutionType::Water);

        assert!(normalized.candidates.is_empty());
        assert_eq!(
            normalized.rejected,
            vec![ValidationError::EmptyCity {
                source_name: "CPCB".to_owned()
            }]
        );
    }

    #[test]
    fn normalization_is_deterministic() {
        let input = extraction(vec![complete_water("Delhi"), complete_water("Agra")]);
        let first = normalizer().normalize(&input, PollutionType::Water);
        let second = normalizer().normalize(&input, PollutionType::Water);

        let summary = |normalized: &Normalized| {
            normalized
                .candidates
                .iter()
                .map(|candidate| {
                    (
                        candidate.city.clone(),
                        candidate.metrics.clone(),
                        candidate.flags.clone(),
                        candidate.collected_at,
                    )
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(summary(&first), summary(&second));
    }
}
