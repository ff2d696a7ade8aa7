//! Raw provider payloads.
//!
//! Provider clients return whatever their upstream hands back. Gateways convert those payloads
//! into [`RawResult`] at the boundary so extraction only ever sees the two recognized shapes.

use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};
use thiserror::Error;

/// Raw response returned by a provider endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawResult {
    /// Ordered sequence of row maps (tabular responses).
    Rows(Vec<JsonMap<String, Value>>),
    /// A single nested map.
    Map(JsonMap<String, Value>),
}

/// A provider payload that is neither a row table nor a nested map.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported raw payload shape: {found}")]
pub struct UnsupportedShape {
    /// JSON kind that was found (`string`, `number`, `array of number`, ...).
    pub found: String,
}

impl RawResult {
    /// Converts an untyped JSON payload into a tagged raw result.
    ///
    /// Arrays become row tables and must contain only objects; objects become nested maps.
    /// Scalars, `null`, and arrays holding non-object items are rejected.
    pub fn from_json(value: Value) -> Result<Self, UnsupportedShape> {
        match value {
            Value::Object(map) => Ok(RawResult::Map(map)),
            Value::Array(items) => {
                let mut rows = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Object(row) => rows.push(row),
                        other => {
                            return Err(UnsupportedShape {
                                found: format!("array of {}", json_kind(&other)),
                            });
                        }
                    }
                }
                Ok(RawResult::Rows(rows))
            }
            other => Err(UnsupportedShape {
                found: json_kind(&other).to_string(),
            }),
        }
    }

    /// Returns true for an empty row table or an empty map.
    pub fn is_empty(&self) -> bool {
        match self {
            RawResult::Rows(rows) => rows.is_empty(),
            RawResult::Map(map) => map.is_empty(),
        }
    }

    /// Number of rows; a nested map counts as one row.
    pub fn row_count(&self) -> usize {
        match self {
            RawResult::Rows(rows) => rows.len(),
            RawResult::Map(map) if map.is_empty() => 0,
            RawResult::Map(_) => 1,
        }
    }

    /// Pivots a key/value table into one map: each row's `key_column` cell names an entry and
    /// its `value_column` cell becomes the value.
    ///
    /// The first row for a key wins. Rows whose key cell is missing or not a scalar are skipped,
    /// and a row without a value cell maps its key to `null`. Maps pass through unchanged.
    pub fn pivot_key_value(self, key_column: &str, value_column: &str) -> RawResult {
        let rows = match self {
            RawResult::Rows(rows) => rows,
            map @ RawResult::Map(_) => return map,
        };
        let mut pivoted = JsonMap::with_capacity(rows.len());
        for mut row in rows {
            let key = match row.get(key_column) {
                Some(Value::String(text)) => text.trim().to_string(),
                Some(Value::Number(number)) => number.to_string(),
                _ => continue,
            };
            if key.is_empty() || pivoted.contains_key(&key) {
                continue;
            }
            let value = row.remove(value_column).unwrap_or(Value::Null);
            pivoted.insert(key, value);
        }
        RawResult::Map(pivoted)
    }

    pub fn shape_name(&self) -> &'static str {
        match self {
            RawResult::Rows(_) => "rows",
            RawResult::Map(_) => "map",
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
