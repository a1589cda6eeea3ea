//! Read-only HTTP endpoints over the served snapshot.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tracing::debug;

use ecomonitor_core::model::{PollutionRecord, PollutionType};
use ecomonitor_core::service::{EcoMonitorService, Health, PollutionQuery};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) service: Arc<EcoMonitorService>,
}

/// Query string of `/api/pollution`.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct PollutionParams {
    city: Option<String>,
    pollution_type: Option<String>,
}

impl PollutionParams {
    /// Collect the filters from raw query pairs. A repeated key keeps its
    /// first value and unknown keys are ignored.
    fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        pairs
            .into_iter()
            .fold(Self::default(), |mut params, (key, value)| {
                match key.as_str() {
                    "city" => {
                        params.city.get_or_insert(value);
                    }
                    "type" => {
                        params.pollution_type.get_or_insert(value);
                    }
                    _ => {}
                }
                params
            })
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct EndpointDoc {
    path: &'static str,
    description: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ApiListing {
    name: &'static str,
    version: &'static str,
    description: &'static str,
    endpoints: Vec<EndpointDoc>,
}

const ENDPOINTS: [(&str, &str); 4] = [
    ("/api/pollution", "Pollution records, filterable by city and type"),
    ("/api/cities", "Cities present in the current snapshot"),
    ("/api/pollution-types", "Pollution types present in the current snapshot"),
    ("/api/health", "Snapshot freshness and generation time"),
];

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(listing))
        .route("/api", get(listing))
        .route("/api/pollution", get(pollution))
        .route("/api/cities", get(cities))
        .route("/api/pollution-types", get(pollution_types))
        .route("/api/health", get(health))
        .with_state(state)
}

async fn listing() -> Json<ApiListing> {
    Json(ApiListing {
        name: "EcoMonitor API",
        version: env!("CARGO_PKG_VERSION"),
        description: "Pollution data for Indian cities",
        endpoints: ENDPOINTS
            .into_iter()
            .map(|(path, description)| EndpointDoc { path, description })
            .collect(),
    })
}

async fn pollution(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Json<Vec<PollutionRecord>> {
    let params = PollutionParams::from_pairs(pairs);
    let query = PollutionQuery::from_params(params.city.as_deref(), params.pollution_type.as_deref());
    let records = state.service.query(&query);
    debug!(?query, records = records.len(), "answered pollution query");
    Json(records)
}

async fn cities(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.service.cities())
}

async fn pollution_types(State(state): State<AppState>) -> Json<Vec<PollutionType>> {
    Json(state.service.pollution_types())
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(state.service.health())
}

#[cfg(test)]
mod tests {
    use axum::http::Uri;
    use chrono::{TimeZone, Utc};
    use ecomonitor_core::model::{CityName, Metrics, SnapshotStatus};
    use ecomonitor_core::snapshot::SnapshotStore;

    use super::*;

    fn record(city: &str, pollution_type: PollutionType) -> PollutionRecord {
        PollutionRecord {
            city: CityName(city.to_owned()),
            pollution_type,
            metrics: Metrics::from([("ph".to_owned(), 7.2)]),
            composite_index: 55.0,
            source_name: "CPCB".to_owned(),
            collected_at: Utc
                .with_ymd_and_hms(2024, 6, 1, 0, 0, 0)
                .single()
                .expect("valid timestamp"),
        }
    }

    fn state(records: Vec<PollutionRecord>) -> AppState {
        let store = Arc::new(SnapshotStore::in_memory());
        if !records.is_empty() {
            store.commit(records).expect("commit");
        }
        AppState {
            service: Arc::new(EcoMonitorService::new(store)),
        }
    }

    fn params(city: Option<&str>, pollution_type: Option<&str>) -> Vec<(String, String)> {
        city.map(|value| ("city".to_owned(), value.to_owned()))
            .into_iter()
            .chain(pollution_type.map(|value| ("type".to_owned(), value.to_owned())))
            .collect()
    }

    fn uri_query(uri: &str) -> Query<Vec<(String, String)>> {
        let uri: Uri = uri.parse().expect("valid uri");
        Query::try_from_uri(&uri).expect("query string decodes")
    }

    #[tokio::test]
    async fn pollution_filters_by_city_and_type() {
        let state = state(vec![
            record("Chennai", PollutionType::Water),
            record("Chennai", PollutionType::Plastic),
            record("Pune", PollutionType::Water),
        ]);

        let Json(all) = pollution(State(state.clone()), Query(Vec::new())).await;
        assert_eq!(all.len(), 3);

        let Json(madras) = pollution(State(state.clone()), Query(params(Some("madras"), None))).await;
        assert_eq!(madras.len(), 2);

        let Json(water) = pollution(State(state), Query(params(Some("chennai"), Some("water")))).await;
        assert_eq!(water, vec![record("Chennai", PollutionType::Water)]);
    }

    #[tokio::test]
    async fn repeated_parameters_use_the_first_value() {
        let state = state(vec![
            record("Pune", PollutionType::Water),
            record("Delhi", PollutionType::Water),
            record("Pune", PollutionType::Soil),
        ]);

        let Json(pune) = pollution(
            State(state.clone()),
            uri_query("http://localhost/api/pollution?city=Pune&city=Delhi"),
        )
        .await;
        assert_eq!(
            pune,
            vec![record("Pune", PollutionType::Water), record("Pune", PollutionType::Soil)]
        );

        let Json(soil) = pollution(
            State(state),
            uri_query("http://localhost/api/pollution?type=soil&page=2&type=water"),
        )
        .await;
        assert_eq!(soil, vec![record("Pune", PollutionType::Soil)]);
    }

    #[test]
    fn params_keep_first_value_per_key() {
        let pairs = vec![
            ("type".to_owned(), "plastic".to_owned()),
            ("city".to_owned(), "Agra".to_owned()),
            ("city".to_owned(), "Kanpur".to_owned()),
        ];
        assert_eq!(
            PollutionParams::from_pairs(pairs),
            PollutionParams {
                city: Some("Agra".to_owned()),
                pollution_type: Some("plastic".to_owned()),
            }
        );
    }

    #[tokio::test]
    async fn unknown_type_yields_empty_list() {
        let state = state(vec![record("Pune", PollutionType::Soil)]);
        let Json(records) = pollution(State(state), Query(params(None, Some("noise")))).await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn derived_views_and_health() {
        let state = state(vec![
            record("Pune", PollutionType::Soil),
            record("Delhi", PollutionType::Soil),
        ]);

        let Json(names) = cities(State(state.clone())).await;
        assert_eq!(names, vec!["Delhi", "Pune"]);

        let Json(types) = pollution_types(State(state.clone())).await;
        assert_eq!(types, vec![PollutionType::Soil]);

        let Json(status) = health(State(state)).await;
        assert_eq!(status.status, SnapshotStatus::Fresh);
        assert!(status.generated_at.is_some());
    }

    #[tokio::test]
    async fn uninitialized_store_is_served_without_error() {
        let state = state(Vec::new());

        let Json(status) = health(State(state.clone())).await;
        assert_eq!(status.status, SnapshotStatus::Uninitialized);

        let Json(records) = pollution(State(state), Query(Vec::new())).await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn listing_names_every_route() {
        let Json(doc) = listing().await;
        let paths: Vec<&str> = doc.endpoints.iter().map(|endpoint| endpoint.path).collect();
        assert_eq!(
            paths,
            vec!["/api/pollution", "/api/cities", "/api/pollution-types", "/api/health"]
        );

        let encoded = serde_json::to_value(&doc).expect("serializes");
        assert_eq!(encoded["name"], "EcoMonitor API");
        let _router = router(state(Vec::new()));
    }
}
