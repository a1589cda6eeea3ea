//! Source implementation for ICAR soil-health survey tables.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder};
use tracing::debug;

use ecomonitor_core::{
    extract::{TableLayout, decode_body},
    model::{Cities, PollutionType, SourceId, SourceMeta},
    plugin::{SourcePlugin, StaticSource},
    ports::{FetchError, RawExtraction, RawRow, SourcePort},
};

const SOURCE_URL: &str = "https://icar.gov.in/";

/// Column layout of soil-health card summaries.
pub const LAYOUT: TableLayout = TableLayout {
    city_columns: &["city", "district", "town", "location", "sampling_location"],
    aliases: &[
        ("heavy_metal", "heavy_metals"),
        ("total_heavy_metals", "heavy_metals"),
        ("n", "nitrogen"),
        ("available_nitrogen", "nitrogen"),
        ("available_n", "nitrogen"),
        ("p", "phosphorus"),
        ("available_phosphorus", "phosphorus"),
        ("available_p", "phosphorus"),
        ("k", "potassium"),
        ("available_potassium", "potassium"),
        ("available_k", "potassium"),
        ("soil_ph", "ph"),
        ("pb", "lead"),
        ("cd", "cadmium"),
        ("as", "arsenic"),
        ("ec", "salinity"),
        ("electrical_conductivity", "salinity"),
    ],
};

/// Live fetch of ICAR soil survey tables.
pub struct IcarSoilSource {
    client: Client,
    meta: SourceMeta,
}

impl IcarSoilSource {
    /// Create a source bound to the given HTTP client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            meta: source_meta(),
        }
    }
}

#[async_trait]
impl SourcePort for IcarSoilSource {
    fn source(&self) -> &SourceMeta {
        &self.meta
    }

    async fn fetch(&self) -> Result<RawExtraction, FetchError> {
        let fetched_at = Utc::now();
        let (content_type, body) = fetch_page(self.client.get(SOURCE_URL)).await?;
        let rows = decode_body(&content_type, &body, PollutionType::Soil, &LAYOUT)?;

        debug!(rows = rows.len(), %content_type, "extracted ICAR soil rows");

        Ok(RawExtraction {
            source_name: self.meta.name.clone(),
            origin: SOURCE_URL.to_owned(),
            fetched_at,
            rows,
        })
    }
}

/// Build the plugin bundle for the live ICAR soil source.
#[must_use]
pub fn plugin(client: Client) -> SourcePlugin {
    SourcePlugin {
        meta: source_meta(),
        port: Arc::new(IcarSoilSource::new(client)),
    }
}

/// Build the plugin bundle for the bundled ICAR reference profile.
#[must_use]
pub fn reference_plugin() -> SourcePlugin {
    StaticSource::new(reference_meta(), reference_rows()).into_plugin()
}

/// Soil baseline per city; nutrients in kg/ha, heavy metals in mg/kg.
#[must_use]
pub fn reference_rows() -> Vec<RawRow> {
    Cities::ALL
        .into_iter()
        .map(|city| {
            let factor = contamination_factor(city);
            RawRow::new(city.to_string())
                .with("ph", round1(6.8 + factor * 1.2))
                .with("nitrogen", round1(250.0 + factor * 120.0))
                .with("phosphorus", round1(30.0 + factor * 15.0))
                .with("potassium", round1(240.0 + factor * 60.0))
                .with("heavy_metals", round1(60.0 + factor * 70.0))
        })
        .collect()
}

fn contamination_factor(city: Cities) -> f64 {
    match city {
        Cities::Delhi => 0.95,
        Cities::Mumbai | Cities::Kolkata | Cities::Ahmedabad | Cities::Lucknow => 0.8,
        Cities::Chennai | Cities::Hyderabad | Cities::Jaipur => 0.75,
        Cities::Bangalore | Cities::Pune => 0.65,
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn source_meta() -> SourceMeta {
    SourceMeta {
        id: SourceId(String::from("icar-soil")),
        name: String::from("Indian Council of Agricultural Research (ICAR)"),
        pollution_type: PollutionType::Soil,
        origin: SOURCE_URL.to_owned(),
    }
}

fn reference_meta() -> SourceMeta {
    SourceMeta {
        id: SourceId(String::from("icar-soil-reference")),
        name: String::from("ICAR Soil Health Survey (reference profile)"),
        pollution_type: PollutionType::Soil,
        origin: String::from("bundled"),
    }
}

async fn fetch_page(req: RequestBuilder) -> Result<(String, String), FetchError> {
    let response = req.send().await?.error_for_status()?;
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("text/html")
        .to_owned();
    let body = response.text().await?;
    Ok((content_type, body))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ecomonitor_core::{
        index::{IndexCalculator, IndexTable},
        normalize::{CityTable, Normalizer},
    };

    use super::*;

    #[test]
    fn json_survey_maps_short_nutrient_headers() {
        let body = r#"[
            {"District": "Ahmedabad", "Soil pH": 7.9, "N": "332 kg/ha", "P": 42.1,
             "K": 287, "Heavy Metal": 116.0, "Pb": 31.5, "EC (dS/m)": 0.8}
        ]"#;

        let rows = decode_body("application/json; charset=utf-8", body, PollutionType::Soil, &LAYOUT)
            .expect("json parses");
        let row = rows.first().expect("row");

        assert_eq!(row.city, "Ahmedabad");
        assert_eq!(row.values.get("ph"), Some(&7.9));
        assert_eq!(row.values.get("nitrogen"), Some(&332.0));
        assert_eq!(row.values.get("phosphorus"), Some(&42.1));
        assert_eq!(row.values.get("potassium"), Some(&287.0));
        assert_eq!(row.values.get("heavy_metals"), Some(&116.0));
        assert_eq!(row.values.get("lead"), Some(&31.5));
        assert_eq!(row.values.get("salinity"), Some(&0.8));
    }

    #[tokio::test]
    async fn reference_profile_yields_indexable_records() {
        let table = Arc::new(IndexTable::default());
        let normalizer = Normalizer::new(CityTable::default(), Arc::clone(&table));
        let calculator = IndexCalculator::new(table);

        let extraction = reference_plugin().port.fetch().await.expect("static fetch");
        let normalized = normalizer.normalize(&extraction, PollutionType::Soil);

        assert_eq!(normalized.candidates.len(), Cities::ALL.len());
        assert!(normalized.rejected.is_empty());
        for candidate in &normalized.candidates {
            assert!(!candidate.is_incomplete(), "{} incomplete", candidate.city);
            let index = calculator.compute_index(candidate).expect("complete");
            assert!((0.0..=100.0).contains(&index));
        }
    }
}
