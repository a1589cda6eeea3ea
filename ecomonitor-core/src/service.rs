//! Read-only query facade over the served snapshot.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{CityName, PollutionRecord, PollutionType, SnapshotStatus};
use crate::normalize::CityTable;
use crate::snapshot::SnapshotStore;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Pollution type filter as received from a client.
pub enum TypeFilter {
    /// A known type.
    Known(PollutionType),
    /// A value that names no type; matches nothing.
    Unrecognized(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Filters for a pollution query; absent filters do not restrict.
pub struct PollutionQuery {
    /// City filter, matched case-insensitively.
    pub city: Option<String>,
    /// Pollution type filter.
    pub pollution_type: Option<TypeFilter>,
}

impl PollutionQuery {
    /// Query without filters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a city.
    #[must_use]
    pub fn city<S: Into<String>>(mut self, city: S) -> Self {
        self.city = Some(city.into());
        self
    }

    /// Restrict to a pollution type.
    #[must_use]
    pub fn pollution_type(mut self, pollution_type: PollutionType) -> Self {
        self.pollution_type = Some(TypeFilter::Known(pollution_type));
        self
    }

    /// Build a query from raw request parameters.
    ///
    /// Blank parameters are treated as absent; an unrecognized type is kept
    /// so the query returns nothing instead of failing.
    #[must_use]
    pub fn from_params(city: Option<&str>, pollution_type: Option<&str>) -> Self {
        fn non_blank(raw: Option<&str>) -> Option<&str> {
            raw.map(str::trim).filter(|value| !value.is_empty())
        }

        Self {
            city: non_blank(city).map(str::to_owned),
            pollution_type: non_blank(pollution_type).map(|raw| {
                raw.parse::<PollutionType>()
                    .map_or_else(|_err| TypeFilter::Unrecognized(raw.to_owned()), TypeFilter::Known)
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
/// Freshness summary of the served snapshot.
pub struct Health {
    /// Snapshot status.
    pub status: SnapshotStatus,
    /// Commit time of the served snapshot.
    pub generated_at: Option<DateTime<Utc>>,
    /// Snapshot version.
    pub version: u64,
    /// Number of records served.
    pub records: usize,
}

/// Public entry point for reading pollution data.
pub struct EcoMonitorService {
    store: Arc<SnapshotStore>,
    cities: CityTable,
}

impl EcoMonitorService {
    /// Create a service reading from the given store.
    #[must_use]
    pub fn new(store: Arc<SnapshotStore>) -> Self {
        Self {
            store,
            cities: CityTable::default(),
        }
    }

    /// Records of the current snapshot matching the query, in stored order.
    #[must_use]
    pub fn query(&self, query: &PollutionQuery) -> Vec<PollutionRecord> {
        let snapshot = self.store.current();

        let city_key = query.city.as_deref().map(|city| {
            self.cities
                .canonicalize(city)
                .map_or_else(|| CityName::key_for(city), |canonical| canonical.key())
        });

        snapshot
            .records
            .iter()
            .filter(|record| city_key.as_ref().is_none_or(|key| record.city.key() == *key))
            .filter(|record| match &query.pollution_type {
                None => true,
                Some(TypeFilter::Known(kind)) => record.pollution_type == *kind,
                Some(TypeFilter::Unrecognized(_)) => false,
            })
            .cloned()
            .collect()
    }

    /// Sorted distinct city names in the current snapshot.
    #[must_use]
    pub fn cities(&self) -> Vec<String> {
        self.store
            .current()
            .records
            .iter()
            .map(|record| record.city.0.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Pollution types present in the current snapshot, in published order.
    #[must_use]
    pub fn pollution_types(&self) -> Vec<PollutionType> {
        let snapshot = self.store.current();
        PollutionType::ALL
            .into_iter()
            .filter(|kind| {
                snapshot
                    .records
                    .iter()
                    .any(|record| record.pollution_type == *kind)
            })
            .collect()
    }

    /// Status of the served snapshot.
    #[must_use]
    pub fn health(&self) -> Health {
        let snapshot = self.store.current();
        Health {
            status: snapshot.status,
            generated_at: snapshot.generated_at,
            version: snapshot.version,
            records: snapshot.records.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::model::Metrics;

    fn record(city: &str, pollution_type: PollutionType, index: f64) -> PollutionRecord {
        PollutionRecord {
            city: CityName(city.to_owned()),
            pollution_type,
            metrics: Metrics::from([("ph".to_owned(), 7.4)]),
            composite_index: index,
            source_name: "test".to_owned(),
            collected_at: Utc
                .with_ymd_and_hms(2023, 1, 15, 0, 0, 0)
                .single()
                .expect("valid timestamp"),
        }
    }

    fn service() -> EcoMonitorService {
        let store = Arc::new(SnapshotStore::in_memory());
        store
            .commit(vec![
                record("Mumbai", PollutionType::Water, 31.2),
                record("Delhi", PollutionType::Water, 20.6),
                record("Mumbai", PollutionType::Soil, 48.0),
            ])
            .expect("commit");
        EcoMonitorService::new(store)
    }

    #[test]
    fn city_filter_ignores_case_and_aliases() {
        let service = service();
        let lower = service.query(&PollutionQuery::new().city("mumbai"));
        let title = service.query(&PollutionQuery::new().city("Mumbai"));
        let alias = service.query(&PollutionQuery::new().city("BOMBAY"));

        assert_eq!(lower.len(), 2);
        assert_eq!(lower, title);
        assert_eq!(lower, alias);
    }

    #[test]
    fn type_filter_returns_exact_records() {
        let service = service();
        let water = service.query(&PollutionQuery::new().pollution_type(PollutionType::Water));

        assert_eq!(
            water,
            vec![
                record("Mumbai", PollutionType::Water, 31.2),
                record("Delhi", PollutionType::Water, 20.6),
            ]
        );
    }

    #[test]
    fn unrecognized_type_matches_nothing() {
        let query = PollutionQuery::from_params(Some(" "), Some("air"));
        assert_eq!(query.city, None);
        assert_eq!(query.pollution_type, Some(TypeFilter::Unrecognized("air".to_owned())));
        assert!(service().query(&query).is_empty());

        let query = PollutionQuery::from_params(None, Some("SOIL"));
        assert_eq!(service().query(&query).len(), 1);
    }

    #[test]
    fn params_are_trimmed_and_blank_ones_ignored() {
        let query = PollutionQuery::from_params(Some("  Delhi "), Some(" water "));
        assert_eq!(query.city.as_deref(), Some("Delhi"));
        assert_eq!(query.pollution_type, Some(TypeFilter::Known(PollutionType::Water)));

        let unfiltered = PollutionQuery::from_params(Some(""), Some("   "));
        assert_eq!(unfiltered, PollutionQuery::new());
        assert_eq!(service().query(&unfiltered).len(), 3);
    }

    #[test]
    fn derived_views_follow_the_snapshot() {
        let service = service();
        assert_eq!(service.cities(), vec!["Delhi", "Mumbai"]);
        assert_eq!(
            service.pollution_types(),
            vec![PollutionType::Water, PollutionType::Soil]
        );
        assert_eq!(service.health().status, SnapshotStatus::Fresh);
        assert_eq!(service.health().records, 3);
    }

    #[test]
    fn empty_store_reports_uninitialized() {
        let service = EcoMonitorService::new(Arc::new(SnapshotStore::in_memory()));
        assert!(service.query(&PollutionQuery::new()).is_empty());
        assert!(service.cities().is_empty());
        assert_eq!(service.health().status, SnapshotStatus::Uninitialized);
    }
}
