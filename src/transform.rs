//! Flattening of downloaded records and the SWAPI people/planets pipeline.

use chrono::DateTime;
use serde_json::Value;

use crate::errors::TransformError;
use crate::fetch::Record;
use crate::table::Table;

/// Columns of the people table written by the SWAPI profile.
pub const PEOPLE_COLUMNS: [&str; 9] = [
    "name",
    "height",
    "mass",
    "hair_color",
    "skin_color",
    "eye_color",
    "birth_year",
    "date",
    "homeworld",
];

/// Build a table from JSON records.
///
/// The header is the union of keys in first-seen order. Nested objects become
/// `parent.child` columns, arrays are kept as compact JSON, `null` and missing
/// keys become empty cells.
pub fn flatten(records: &[Record]) -> Table {
    let flat: Vec<Vec<(String, String)>> = records
        .iter()
        .map(|record| {
            let mut cells = Vec::new();
            flatten_object(None, record, &mut cells);
            cells
        })
        .collect();

    let mut header: Vec<String> = Vec::new();
    for cells in &flat {
        for (key, _) in cells {
            if !header.contains(key) {
                header.push(key.clone());
            }
        }
    }

    let rows = flat
        .into_iter()
        .map(|cells| {
            header
                .iter()
                .map(|column| {
                    cells
                        .iter()
                        .find(|(key, _)| key == column)
                        .map(|(_, value)| value.clone())
                        .unwrap_or_default()
                })
                .collect()
        })
        .collect();

    Table::new(header, rows)
}

fn flatten_object(
    prefix: Option<&str>,
    object: &serde_json::Map<String, Value>,
    cells: &mut Vec<(String, String)>,
) {
    for (key, value) in object {
        let key = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(inner) => flatten_object(Some(&key), inner, cells),
            other => cells.push((key, cell(other))),
        }
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Reduce an RFC 3339 timestamp to `YYYY-MM-DD`.
pub fn to_date(value: &str) -> Result<String, TransformError> {
    let parsed = DateTime::parse_from_rfc3339(value).map_err(|source| TransformError::BadDate {
        value: value.to_string(),
        source,
    })?;
    Ok(parsed.format("%Y-%m-%d").to_string())
}

/// Planets lookup table: `homeworld_name`, `url`.
pub fn planets(records: &[Record]) -> Result<Table, TransformError> {
    Ok(flatten(records)
        .cut(&["name", "url"])?
        .rename(&[("name", "homeworld_name")]))
}

/// People table with homeworld names resolved through `planets`.
///
/// People whose homeworld is missing from `planets` are dropped.
pub fn people_with_homeworlds(records: &[Record], planets: &Table) -> Result<Table, TransformError> {
    let joined = flatten(records).join(planets, "homeworld", "url")?;
    Ok(joined
        .cut(&[
            "name",
            "height",
            "mass",
            "hair_color",
            "skin_color",
            "eye_color",
            "birth_year",
            "edited",
            "homeworld_name",
        ])?
        .convert("edited", to_date)?
        .rename(&[("edited", "date"), ("homeworld_name", "homeworld")]))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::json;

    use crate::fetch::Record;

    fn record(value: serde_json::Value) -> Record {
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!("fixture records are objects"),
        }
    }

    pub fn luke() -> Record {
        record(json!({
            "name": "Luke Skywalker",
            "height": "172",
            "mass": "77",
            "hair_color": "blond",
            "skin_color": "fair",
            "eye_color": "blue",
            "birth_year": "19BBY",
            "gender": "male",
            "homeworld": "https://swapi.dev/api/planets/1/",
            "films": ["https://swapi.dev/api/films/1/"],
            "edited": "2014-12-20T21:17:56.891000Z",
            "url": "https://swapi.dev/api/people/1/"
        }))
    }

    pub fn leia() -> Record {
        record(json!({
            "name": "Leia Organa",
            "height": "150",
            "mass": "49",
            "hair_color": "brown",
            "skin_color": "light",
            "eye_color": "brown",
            "birth_year": "19BBY",
            "gender": "female",
            "homeworld": "https://swapi.dev/api/planets/2/",
            "films": [],
            "edited": "2014-12-20T21:17:50.315000Z",
            "url": "https://swapi.dev/api/people/5/"
        }))
    }

    pub fn tatooine() -> Record {
        record(json!({
            "name": "Tatooine",
            "climate": "arid",
            "url": "https://swapi.dev/api/planets/1/"
        }))
    }

    pub fn alderaan() -> Record {
        record(json!({
            "name": "Alderaan",
            "climate": "temperate",
            "url": "https://swapi.dev/api/planets/2/"
        }))
    }
}
