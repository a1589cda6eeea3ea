//! Turns fetched HTML tables or JSON documents into raw rows.

use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};

use crate::model::PollutionType;
use crate::ports::{FetchError, RawRow};

/// Column layout a source uses in its published tables.
#[derive(Debug, Clone, Copy)]
pub struct TableLayout {
    /// Slugged header names that hold the city.
    pub city_columns: &'static [&'static str],
    /// Slugged header aliases and the metric key each one maps to.
    pub aliases: &'static [(&'static str, &'static str)],
}

impl TableLayout {
    fn is_city_column(&self, header: &str) -> bool {
        let slug = slugify(header);
        self.city_columns.contains(&slug.as_str())
    }

    /// Metric key for a header; unmapped headers keep their slug.
    #[must_use]
    pub fn metric_key(&self, header: &str) -> String {
        let slug = slugify(header);
        self.aliases
            .iter()
            .find(|(alias, _)| *alias == slug)
            .map_or(slug, |(_, key)| (*key).to_owned())
    }
}

/// Decode a fetched body based on its content type.
///
/// # Errors
///
/// Returns [`FetchError::Parse`] when a JSON body is not a known document shape.
pub fn decode_body(
    content_type: &str,
    body: &str,
    pollution_type: PollutionType,
    layout: &TableLayout,
) -> Result<Vec<RawRow>, FetchError> {
    if content_type.to_ascii_lowercase().contains("json") {
        parse_json_rows(body, pollution_type, layout)
    } else {
        parse_html_tables(body, layout)
    }
}

/// Extract rows from every table whose header row names a city column.
///
/// Tables without a city column are skipped. Cells that are not numeric are
/// left out of the row rather than read as zero.
///
/// # Errors
///
/// Returns [`FetchError::Parse`] if a selector cannot be built.
pub fn parse_html_tables(html: &str, layout: &TableLayout) -> Result<Vec<RawRow>, FetchError> {
    let document = Html::parse_document(html);
    let table_selector = selector("table")?;
    let row_selector = selector("tr")?;
    let cell_selector = selector("th, td")?;

    let mut rows = Vec::new();

    for table in document.select(&table_selector) {
        let mut table_rows = table.select(&row_selector);
        let Some(header) = table_rows.next() else {
            continue;
        };

        let headers: Vec<String> = header.select(&cell_selector).map(cell_text).collect();
        let Some(city_index) = headers
            .iter()
            .position(|heading| layout.is_city_column(heading))
        else {
            continue;
        };
        let keys: Vec<String> = headers
            .iter()
            .map(|heading| layout.metric_key(heading))
            .collect();

        for table_row in table_rows {
            let cells: Vec<String> = table_row.select(&cell_selector).map(cell_text).collect();
            let Some(city) = cells.get(city_index) else {
                continue;
            };

            let mut row = RawRow::new(city.clone());
            for (index, (key, cell)) in keys.iter().zip(&cells).enumerate() {
                if index == city_index {
                    continue;
                }
                if let Some(value) = parse_number(cell) {
                    row.values.insert(key.clone(), value);
                }
            }
            rows.push(row);
        }
    }

    Ok(rows)
}

/// Extract rows from a JSON row array or an `{"data": [...]}` document.
///
/// Rows carrying a `type` field for another pollution type are skipped.
/// Metrics are read from a nested `metrics` object when present, otherwise
/// from the row's own numeric fields.
///
/// # Errors
///
/// Returns [`FetchError::Parse`] for invalid JSON or an unknown document shape.
pub fn parse_json_rows(
    body: &str,
    pollution_type: PollutionType,
    layout: &TableLayout,
) -> Result<Vec<RawRow>, FetchError> {
    let document: Value =
        serde_json::from_str(body).map_err(|err| FetchError::Parse(err.to_string()))?;

    let entries = match &document {
        Value::Array(items) => items,
        Value::Object(fields) => match fields.get("data") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(FetchError::Parse(
                    "expected a `data` array in the JSON document".to_owned(),
                ));
            }
        },
        _ => {
            return Err(FetchError::Parse(
                "expected a JSON array or object".to_owned(),
            ));
        }
    };

    let mut rows = Vec::new();

    for entry in entries {
        let Value::Object(fields) = entry else {
            continue;
        };

        if let Some(kind) = fields.get("type").and_then(Value::as_str)
            && !kind.trim().eq_ignore_ascii_case(pollution_type.as_str())
        {
            continue;
        }

        let city = fields
            .iter()
            .find(|(name, _)| layout.is_city_column(name))
            .and_then(|(_, value)| value.as_str())
            .unwrap_or_default();

        let metrics: &Map<String, Value> = match fields.get("metrics") {
            Some(Value::Object(nested)) => nested,
            _ => fields,
        };

        let mut row = RawRow::new(city);
        for (name, value) in metrics {
            if layout.is_city_column(name) {
                continue;
            }
            if let Some(number) = json_number(value) {
                row.values.insert(layout.metric_key(name), number);
            }
        }
        rows.push(row);
    }

    Ok(rows)
}

/// Lowercase a header, drop parenthesised units, and join words with `_`.
#[must_use]
pub fn slugify(header: &str) -> String {
    let mut slug = String::with_capacity(header.len());
    let mut depth = 0_u32;

    for ch in header.chars() {
        match ch {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth > 0 => {}
            _ if ch.is_alphanumeric() => slug.extend(ch.to_lowercase()),
            _ => {
                if !slug.is_empty() && !slug.ends_with('_') {
                    slug.push('_');
                }
            }
        }
    }

    while slug.ends_with('_') {
        slug.pop();
    }
    slug
}

/// Leading number of a table cell such as `"12.5 mg/l"` or `"<0.5"`.
fn parse_number(cell: &str) -> Option<f64> {
    let trimmed = cell.trim().trim_start_matches(['<', '>', '~']).trim_start();
    let numeric: String = trimmed
        .chars()
        .filter(|ch| *ch != ',')
        .take_while(|ch| ch.is_ascii_digit() || *ch == '.' || *ch == '-')
        .collect();
    numeric
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

fn json_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64().filter(|value| value.is_finite()),
        Value::String(text) => parse_number(text),
        _ => None,
    }
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn selector(css: &str) -> Result<Selector, FetchError> {
    Selector::parse(css).map_err(|err| FetchError::Parse(format!("invalid selector {css}: {err:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUT: TableLayout = TableLayout {
        city_columns: &["city", "location"],
        aliases: &[("do", "dissolved_oxygen"), ("biochemical_oxygen_demand", "bod")],
    };

    #[test]
    fn slugify_strips_units_and_punctuation() {
        assert_eq!(slugify("Dissolved Oxygen (mg/l)"), "dissolved_oxygen");
        assert_eq!(slugify("  pH "), "ph");
        assert_eq!(slugify("Total Coliform [MPN/100ml]"), "total_coliform");
    }

    #[test]
    fn html_table_rows_keep_absent_cells_absent() {
        let html = r"
            <html><body>
              <table><tr><th>Station</th><th>Value</th></tr><tr><td>X</td><td>1</td></tr></table>
              <table>
                <tr><th>Location</th><th>Biochemical Oxygen Demand (mg/l)</th><th>DO</th><th>Remarks</th></tr>
                <tr><td> New  Delhi </td><td>12.5 mg/l</td><td>BDL</td><td>poor</td></tr>
                <tr><td>Chennai</td><td>1,204</td><td>0</td><td>-</td></tr>
              </table>
            </body></html>";

        let rows = parse_html_tables(html, &LAYOUT).expect("html parses");

        assert_eq!(rows.len(), 2);
        let delhi = rows.first().expect("first row");
        assert_eq!(delhi.city, "New Delhi");
        assert_eq!(delhi.values.get("bod"), Some(&12.5));
        assert!(!delhi.values.contains_key("dissolved_oxygen"));
        assert!(!delhi.values.contains_key("remarks"));

        let chennai = rows.get(1).expect("second row");
        assert_eq!(chennai.values.get("bod"), Some(&1204.0));
        assert_eq!(chennai.values.get("dissolved_oxygen"), Some(&0.0));
    }

    #[test]
    fn json_document_filters_other_types_and_reads_nested_metrics() {
        let body = r#"{
            "cities": ["Mumbai"],
            "data": [
                {"city": "Mumbai", "type": "water", "aqi": 85.0, "metrics": {"bod": 35.0, "DO": "3.6"}},
                {"city": "Mumbai", "type": "soil", "metrics": {"ph": 7.8}}
            ]
        }"#;

        let rows = parse_json_rows(body, PollutionType::Water, &LAYOUT).expect("json parses");

        assert_eq!(rows.len(), 1);
        let row = rows.first().expect("water row");
        assert_eq!(row.values.get("bod"), Some(&35.0));
        assert_eq!(row.values.get("dissolved_oxygen"), Some(&3.6));
        assert!(!row.values.contains_key("aqi"));
    }

    #[test]
    fn json_with_unknown_shape_is_a_parse_error() {
        let err = parse_json_rows(r#"{"rows": []}"#, PollutionType::Water, &LAYOUT)
            .expect_err("unknown shape");
        assert!(matches!(err, FetchError::Parse(_)));

        let err = decode_body("application/json", "<html>", PollutionType::Water, &LAYOUT)
            .expect_err("not json");
        assert!(matches!(err, FetchError::Parse(_)));
    }
}
