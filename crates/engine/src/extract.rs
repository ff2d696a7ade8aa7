//! Value extraction from raw provider results.
//!
//! Row tables are read from their first row only; nested maps are walked one key per path
//! segment. Both shapes share the same missing-value normalization so a blank string, `null`,
//! and NaN-like markers all come back as `None`.

use fieldmesh_types::{EndpointDescriptor, FieldPath, PayloadLayout, RawResult, ResolvedRecord};
use serde_json::{Map as JsonMap, Value};
use tracing::warn;

use crate::transform::TransformRegistry;

/// Text markers that upstream tabular sources use for absent cells.
const MISSING_MARKERS: &[&str] = &["nan", "nat", "none", "null", "n/a", "--"];

/// Extracts the value at `path` from `raw`, normalizing absent data to `None`.
///
/// # Examples
/// ```rust
/// use fieldmesh_engine::extract::extract;
/// use fieldmesh_types::{FieldPath, RawResult};
/// use serde_json::json;
///
/// let raw = RawResult::from_json(json!({"affiliate_industry": {"ind_name": "Banking"}})).unwrap();
/// assert_eq!(extract(&raw, &FieldPath::from("affiliate_industry.ind_name")), Some(json!("Banking")));
/// assert_eq!(extract(&raw, &FieldPath::from("affiliate_industry.ind_code")), None);
/// ```
pub fn extract(raw: &RawResult, path: &FieldPath) -> Option<Value> {
    let row = match raw {
        RawResult::Rows(rows) => rows.first()?,
        RawResult::Map(map) => map,
    };
    lookup(row, path).and_then(normalize)
}

/// Returns the value unless it counts as missing.
pub fn normalize(value: &Value) -> Option<Value> {
    if is_missing(value) { None } else { Some(value.clone()) }
}

/// True for `null`, blank strings, NaN-like markers, and empty containers.
pub fn is_missing(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => {
            let text = text.trim();
            text.is_empty() || MISSING_MARKERS.iter().any(|marker| text.eq_ignore_ascii_case(marker))
        }
        Value::Number(number) => number.as_f64().is_some_and(f64::is_nan),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) => false,
    }
}

/// Resolves `path` inside one row or map.
///
/// An exact key match wins so that column names containing dots stay addressable; otherwise the
/// path is walked segment by segment through nested maps.
fn lookup<'a>(row: &'a JsonMap<String, Value>, path: &FieldPath) -> Option<&'a Value> {
    if let Some(value) = row.get(path.as_str()) {
        return Some(value);
    }
    let mut segments = path.segments();
    let mut current = row.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Maps every row of a list-style response into a record using the endpoint's field map.
///
/// Cells are normalized like [`extract`] and pass through the endpoint's per-field transforms.
/// A transform failure drops that cell only; rows that produce no values are skipped. Key/value
/// endpoints describe a single record, so their table is pivoted first and yields at most one.
pub fn map_rows(raw: &RawResult, descriptor: &EndpointDescriptor, transforms: &TransformRegistry) -> Vec<ResolvedRecord> {
    let shaped;
    let raw = match descriptor.layout {
        PayloadLayout::Columns => raw,
        PayloadLayout::KeyValue => {
            shaped = descriptor.shape_payload(raw.clone());
            &shaped
        }
    };
    let rows: Vec<&JsonMap<String, Value>> = match raw {
        RawResult::Rows(rows) => rows.iter().collect(),
        RawResult::Map(map) => vec![map],
    };

    let mut records = Vec::with_capacity(rows.len());
    for (row_index, row) in rows.into_iter().enumerate() {
        let mut record = ResolvedRecord::new();
        for (field, path) in &descriptor.fields {
            let Some(value) = lookup(row, path).and_then(normalize) else {
                continue;
            };
            let value = match descriptor.transforms.get(field) {
                Some(transform_name) => match transforms.apply(transform_name, &value) {
                    Ok(transformed) => transformed,
                    Err(error) => {
                        warn!(
                            endpoint = %descriptor.id,
                            field = %field,
                            row = row_index,
                            error = %error,
                            "row value transform failed"
                        );
                        continue;
                    }
                },
                None => value,
            };
            if let Some(value) = normalize(&value) {
                record.insert_if_absent(field.clone(), value);
            }
        }
        if !record.is_empty() {
            records.push(record);
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::indexmap;
    use serde_json::json;

    fn raw(value: Value) -> RawResult {
        RawResult::from_json(value).expect("recognized shape")
    }

    #[test]
    fn reads_first_row_of_tables() {
        let table = raw(json!([
            {"code": "600000", "name": "X Bank"},
            {"code": "000001", "name": "Y Bank"}
        ]));
        assert_eq!(extract(&table, &FieldPath::from("name")), Some(json!("X Bank")));
        assert_eq!(extract(&table, &FieldPath::from("industry")), None);
        assert_eq!(extract(&raw(json!([])), &FieldPath::from("name")), None);
    }

    #[test]
    fn walks_nested_maps_and_rejects_non_map_segments() {
        let map = raw(json!({"data": {"stock": {"code": "600000"}}, "flat": "value"}));
        assert_eq!(extract(&map, &FieldPath::from("data.stock.code")), Some(json!("600000")));
        assert_eq!(extract(&map, &FieldPath::from("data.missing.code")), None);
        assert_eq!(extract(&map, &FieldPath::from("flat.inner")), None);
    }

    #[test]
    fn exact_keys_with_dots_take_precedence() {
        let map = raw(json!({"data.code": "literal", "data": {"code": "nested"}}));
        assert_eq!(extract(&map, &FieldPath::from("data.code")), Some(json!("literal")));
    }

    #[test]
    fn table_cells_may_hold_nested_maps() {
        let table = raw(json!([{"affiliate_industry": {"ind_name": "Banking", "ind_code": ""}}]));
        assert_eq!(extract(&table, &FieldPath::from("affiliate_industry.ind_name")), Some(json!("Banking")));
        assert_eq!(extract(&table, &FieldPath::from("affiliate_industry.ind_code")), None);
    }

    #[test]
    fn missing_markers_normalize_identically_across_shapes() {
        for marker in [json!(""), json!("   "), Value::Null, json!("NaN"), json!("nan"), json!("NaT"), json!("None")] {
            let table = raw(json!([{ "field": marker.clone() }]));
            let map = raw(json!({ "field": marker.clone() }));
            assert_eq!(extract(&table, &FieldPath::from("field")), None, "table marker {marker}");
            assert_eq!(extract(&map, &FieldPath::from("field")), None, "map marker {marker}");
        }
    }

    #[test]
    fn falsy_scalars_are_present_values() {
        let map = raw(json!({"count": 0, "active": false}));
        assert_eq!(extract(&map, &FieldPath::from("count")), Some(json!(0)));
        assert_eq!(extract(&map, &FieldPath::from("active")), Some(json!(false)));
    }

    #[test]
    fn map_rows_applies_field_map_and_transforms_per_row() {
        let descriptor = EndpointDescriptor {
            id: "lhb_brokerage".into(),
            provider: "akshare".into(),
            description: None,
            params: Default::default(),
            fields: indexmap! {
                "brokerage_code".to_string() => FieldPath::from("code"),
                "listed_date".to_string() => FieldPath::from("date"),
            },
            transforms: indexmap! {
                "listed_date".to_string() => "compact_date_to_iso".to_string(),
            },
            layout: PayloadLayout::Columns,
            key_value: Default::default(),
        };
        let table = raw(json!([
            {"code": "80001", "date": "20240102"},
            {"code": "80002", "date": "not a date"},
            {"code": "", "date": "NaN"}
        ]));

        let records = map_rows(&table, &descriptor, &TransformRegistry::with_builtins());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("listed_date"), Some(&json!("2024-01-02")));
        assert_eq!(records[1].get("brokerage_code"), Some(&json!("80002")));
        assert!(!records[1].contains("listed_date"));
    }

    #[test]
    fn key_value_tables_only_resolve_once_pivoted() {
        let table = raw(json!([
            {"item": "股票代码", "value": "002156"},
            {"item": "股票简称", "value": "通富微电"},
            {"item": "上市时间", "value": 20070816}
        ]));
        assert_eq!(extract(&table, &FieldPath::from("股票简称")), None);

        let descriptor = EndpointDescriptor {
            id: "stock_individual_info_em".into(),
            provider: "akshare".into(),
            description: None,
            params: Default::default(),
            fields: indexmap! {
                "name".to_string() => FieldPath::from("股票简称"),
                "list_date".to_string() => FieldPath::from("上市时间"),
            },
            transforms: indexmap! {
                "list_date".to_string() => "compact_date_to_iso".to_string(),
            },
            layout: PayloadLayout::KeyValue,
            key_value: Default::default(),
        };
        let pivoted = descriptor.shape_payload(table.clone());
        assert_eq!(extract(&pivoted, &FieldPath::from("股票简称")), Some(json!("通富微电")));

        let records = map_rows(&table, &descriptor, &TransformRegistry::with_builtins());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("name"), Some(&json!("通富微电")));
        assert_eq!(records[0].get("list_date"), Some(&json!("2007-08-16")));
    }
}
