//! Source implementation for CPCB and CSE plastic waste reports.

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

const SOURCE_URL: &str = "https://cpcb.nic.in/plastic-waste-management/";

/// Column layout of plastic waste generation reports.
pub const LAYOUT: TableLayout = TableLayout {
    city_columns: &["city", "city_town", "ulb", "urban_local_body", "town", "location"],
    aliases: &[
        ("plastic_waste_generation", "waste_generation"),
        ("plastic_waste_generated", "waste_generation"),
        ("waste_generated", "waste_generation"),
        ("pwg", "waste_generation"),
        ("recycling", "recycling_rate"),
        ("recycled", "recycling_rate"),
        ("recycling_percentage", "recycling_rate"),
        ("single_use_plastic", "single_use"),
        ("single_use_share", "single_use"),
        ("sup", "single_use"),
        ("mismanaged_waste", "mismanaged"),
        ("mismanaged_plastic", "mismanaged"),
        ("microplastic", "microplastics"),
    ],
};

/// Live fetch of the CPCB plastic waste management page.
pub struct CpcbPlasticSource {
    client: Client,
    meta: SourceMeta,
}

impl CpcbPlasticSource {
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
impl SourcePort for CpcbPlasticSource {
    fn source(&self) -> &SourceMeta {
        &self.meta
    }

    async fn fetch(&self) -> Result<RawExtraction, FetchError> {
        let fetched_at = Utc::now();
        let (content_type, body) = fetch_page(self.client.get(SOURCE_URL)).await?;
        let rows = decode_body(&content_type, &body, PollutionType::Plastic, &LAYOUT)?;

        debug!(rows = rows.len(), %content_type, "extracted plastic waste rows");

        Ok(RawExtraction {
            source_name: self.meta.name.clone(),
            origin: SOURCE_URL.to_owned(),
            fetched_at,
            rows,
        })
    }
}

/// Build the plugin bundle for the live plastic waste source.
#[must_use]
pub fn plugin(client: Client) -> SourcePlugin {
    SourcePlugin {
        meta: source_meta(),
        port: Arc::new(CpcbPlasticSource::new(client)),
    }
}

/// Build the plugin bundle for the bundled CSE reference profile.
#[must_use]
pub fn reference_plugin() -> SourcePlugin {
    StaticSource::new(reference_meta(), reference_rows()).into_plugin()
}

/// Plastic waste baseline per city.
///
/// Generation is in tonnes per day and scales with city size; the remaining
/// metrics are percentages, except microplastics in particles per litre.
#[must_use]
pub fn reference_rows() -> Vec<RawRow> {
    Cities::ALL
        .into_iter()
        .map(|city| {
            let factor = waste_factor(city);
            RawRow::new(city.to_string())
                .with(
                    "waste_generation",
                    round1((400.0 + factor * 400.0) * population_factor(city)),
                )
                .with("recycling_rate", round1(25.0 + (1.0 - factor) * 25.0))
                .with("mismanaged", round1(45.0 + factor * 25.0))
                .with("microplastics", round1(10.0 + factor * 15.0))
                .with("single_use", round1(60.0 + factor * 20.0))
        })
        .collect()
}

fn waste_factor(city: Cities) -> f64 {
    match city {
        Cities::Delhi => 0.95,
        Cities::Mumbai | Cities::Kolkata => 0.85,
        Cities::Chennai
        | Cities::Ahmedabad
        | Cities::Lucknow
        | Cities::Pune
        | Cities::Jaipur
        | Cities::Hyderabad
        | Cities::Bangalore => 0.75,
    }
}

fn population_factor(city: Cities) -> f64 {
    match city {
        Cities::Mumbai | Cities::Delhi => 1.3,
        Cities::Bangalore | Cities::Hyderabad | Cities::Chennai | Cities::Kolkata => 1.1,
        Cities::Pune | Cities::Ahmedabad | Cities::Jaipur | Cities::Lucknow => 1.0,
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn source_meta() -> SourceMeta {
    SourceMeta {
        id: SourceId(String::from("cpcb-plastic")),
        name: String::from("Central Pollution Control Board (CPCB)"),
        pollution_type: PollutionType::Plastic,
        origin: SOURCE_URL.to_owned(),
    }
}

fn reference_meta() -> SourceMeta {
    SourceMeta {
        id: SourceId(String::from("cse-plastic-reference")),
        name: String::from("Centre for Science and Environment (reference profile)"),
        pollution_type: PollutionType::Plastic,
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
    fn report_table_maps_onto_metric_keys() {
        let html = r"
            <table>
              <tr><th>S.No.</th><th>Total</th></tr>
              <tr><td>1</td><td>3,469,780</td></tr>
            </table>
            <table>
              <tr><th>ULB</th><th>Plastic Waste Generated (TPD)</th><th>Recycled (%)</th>
                  <th>Single-use Plastic (%)</th><th>Mismanaged Waste (%)</th></tr>
              <tr><td>Greater Mumbai</td><td>1,044</td><td>27.5</td><td>77</td><td>66.3</td></tr>
            </table>";

        let rows = decode_body("text/html", html, PollutionType::Plastic, &LAYOUT).expect("parses");

        assert_eq!(rows.len(), 1);
        let row = rows.first().expect("row");
        assert_eq!(row.city, "Greater Mumbai");
        assert_eq!(row.values.get("waste_generation"), Some(&1044.0));
        assert_eq!(row.values.get("recycling_rate"), Some(&27.5));
        assert_eq!(row.values.get("single_use"), Some(&77.0));
        assert_eq!(row.values.get("mismanaged"), Some(&66.3));
    }

    #[tokio::test]
    async fn reference_profile_yields_indexable_records() {
        let table = Arc::new(IndexTable::default());
        let normalizer = Normalizer::new(CityTable::default(), Arc::clone(&table));
        let calculator = IndexCalculator::new(table);

        let extraction = reference_plugin().port.fetch().await.expect("static fetch");
        let normalized = normalizer.normalize(&extraction, PollutionType::Plastic);

        assert_eq!(normalized.candidates.len(), Cities::ALL.len());
        for candidate in &normalized.candidates {
            assert!(candidate.flags.is_empty(), "{} flagged", candidate.city);
            let index = calculator.compute_index(candidate).expect("complete");
            assert!((0.0..=100.0).contains(&index));
        }
    }

    #[test]
    fn larger_cities_generate_more_waste() {
        let rows = reference_rows();
        let generation = |name: &str| {
            rows.iter()
                .find(|row| row.city == name)
                .and_then(|row| row.values.get("waste_generation").copied())
        };
        assert!(generation("Mumbai") > generation("Pune"));
        assert!(generation("Delhi") > generation("Mumbai"));
    }
}
