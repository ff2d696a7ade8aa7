//! Named value transforms.
//!
//! Configuration refers to transforms by name; the [`TransformRegistry`] binds those names to
//! functions. Registries start with the built-in set and accept custom functions before the
//! engine configuration is loaded, so every name a plan references is checked at load time.

use std::{collections::BTreeMap, fmt, sync::Arc};

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde_json::Value;

use crate::error::TransformError;

/// Signature shared by every transform.
pub type TransformFn = dyn Fn(&Value) -> Result<Value, TransformError> + Send + Sync;

/// A transform resolved from the registry, kept together with its configured name.
#[derive(Clone)]
pub struct BoundTransform {
    name: String,
    function: Arc<TransformFn>,
}

impl BoundTransform {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, value: &Value) -> Result<Value, TransformError> {
        (self.function)(value)
    }
}

impl fmt::Debug for BoundTransform {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_tuple("BoundTransform").field(&self.name).finish()
    }
}

/// Name → transform function table.
#[derive(Clone)]
pub struct TransformRegistry {
    transforms: BTreeMap<String, Arc<TransformFn>>,
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for TransformRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_list().entries(self.transforms.keys()).finish()
    }
}

impl TransformRegistry {
    /// Registry without any transforms.
    pub fn empty() -> Self {
        Self {
            transforms: BTreeMap::new(),
        }
    }

    /// Registry holding the built-in transforms.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("identity", |value| Ok(value.clone()));
        registry.register("trim", trim);
        registry.register("to_string", to_string);
        registry.register("market_prefix", market_prefix);
        registry.register("exchange_of", exchange_of);
        registry.register("epoch_millis_to_date", |value| epoch_to_date("epoch_millis_to_date", value, EpochUnit::Millis, 0));
        registry.register("epoch_millis_to_date_cst", |value| {
            epoch_to_date("epoch_millis_to_date_cst", value, EpochUnit::Millis, CHINA_STANDARD_OFFSET_SECS)
        });
        registry.register("epoch_to_date", |value| epoch_to_date("epoch_to_date", value, EpochUnit::Auto, 0));
        registry.register("epoch_to_date_cst", |value| {
            epoch_to_date("epoch_to_date_cst", value, EpochUnit::Auto, CHINA_STANDARD_OFFSET_SECS)
        });
        registry.register("compact_date_to_iso", compact_date_to_iso);
        registry
    }

    /// Registers `function` under `name`, replacing any previous binding.
    pub fn register<F>(&mut self, name: impl Into<String>, function: F) -> &mut Self
    where
        F: Fn(&Value) -> Result<Value, TransformError> + Send + Sync + 'static,
    {
        self.transforms.insert(name.into(), Arc::new(function));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transforms.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.transforms.keys().map(String::as_str)
    }

    pub fn bind(&self, name: &str) -> Option<BoundTransform> {
        self.transforms.get(name).map(|function| BoundTransform {
            name: name.to_string(),
            function: Arc::clone(function),
        })
    }

    pub fn apply(&self, name: &str, value: &Value) -> Result<Value, TransformError> {
        let function = self.transforms.get(name).ok_or_else(|| TransformError::Unknown { name: name.to_string() })?;
        function(value)
    }
}

fn invalid(name: &str, expected: &str, value: &Value) -> TransformError {
    TransformError::InvalidInput {
        name: name.to_string(),
        expected: expected.to_string(),
        found: value.to_string(),
    }
}

/// Renders scalars as plain text; `None` for arrays, objects, and null.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn trim(value: &Value) -> Result<Value, TransformError> {
    match value {
        Value::String(text) => Ok(Value::String(text.trim().to_string())),
        other => Ok(other.clone()),
    }
}

fn to_string(value: &Value) -> Result<Value, TransformError> {
    scalar_text(value)
        .map(Value::String)
        .ok_or_else(|| invalid("to_string", "a scalar", value))
}

/// Exchange code for a mainland security code (`SZ` for 0/3, `SH` for 6, `BJ` for 4/8).
fn exchange_for_code(code: &str) -> Option<&'static str> {
    match code.chars().next()? {
        '0' | '3' => Some("SZ"),
        '6' => Some("SH"),
        '4' | '8' => Some("BJ"),
        _ => None,
    }
}

fn market_prefix(value: &Value) -> Result<Value, TransformError> {
    let code = scalar_text(value).ok_or_else(|| invalid("market_prefix", "a security code", value))?;
    let code = code.trim();
    match exchange_for_code(code) {
        Some(exchange) => Ok(Value::String(format!("{exchange}{code}"))),
        None => Ok(Value::String(code.to_string())),
    }
}

fn exchange_of(value: &Value) -> Result<Value, TransformError> {
    let code = scalar_text(value).ok_or_else(|| invalid("exchange_of", "a security code", value))?;
    Ok(Value::String(exchange_for_code(code.trim()).unwrap_or("SZ").to_string()))
}

/// Epoch values above this are milliseconds; at or below it they are seconds.
const MILLIS_THRESHOLD: i64 = 10_000_000_000;

const CHINA_STANDARD_OFFSET_SECS: i32 = 8 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EpochUnit {
    /// Milliseconds only; values at or below the threshold are rejected.
    Millis,
    /// Milliseconds above the threshold, seconds otherwise.
    Auto,
}

/// Epoch timestamp (number or numeric text) → `YYYY-MM-DD` in the zone `offset_secs` east of UTC.
fn epoch_to_date(name: &str, value: &Value, unit: EpochUnit, offset_secs: i32) -> Result<Value, TransformError> {
    let raw = match value {
        Value::Number(number) => number.as_i64().or_else(|| number.as_f64().map(|float| float as i64)),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<i64>().ok().or_else(|| text.parse::<f64>().ok().map(|float| float as i64))
        }
        _ => None,
    }
    .ok_or_else(|| invalid(name, "an epoch timestamp", value))?;

    let millis = match unit {
        EpochUnit::Millis if raw <= MILLIS_THRESHOLD => return Err(invalid(name, "a millisecond timestamp", value)),
        EpochUnit::Millis => raw,
        EpochUnit::Auto if raw > MILLIS_THRESHOLD => raw,
        EpochUnit::Auto => raw.checked_mul(1000).ok_or_else(|| invalid(name, "a timestamp in range", value))?,
    };

    let offset = FixedOffset::east_opt(offset_secs).ok_or_else(|| invalid(name, "a valid utc offset", value))?;
    let timestamp = DateTime::from_timestamp_millis(millis).ok_or_else(|| invalid(name, "a timestamp in range", value))?;
    Ok(Value::String(timestamp.with_timezone(&offset).date_naive().format("%Y-%m-%d").to_string()))
}

/// `YYYYMMDD` (text or number) → `YYYY-MM-DD`; ISO dates pass through normalized.
fn compact_date_to_iso(value: &Value) -> Result<Value, TransformError> {
    let text = scalar_text(value).ok_or_else(|| invalid("compact_date_to_iso", "a YYYYMMDD date", value))?;
    let text = text.trim();
    let date = NaiveDate::parse_from_str(text, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(text, "%Y-%m-%d"))
        .map_err(|_| invalid("compact_date_to_iso", "a YYYYMMDD date", value))?;
    Ok(Value::String(date.format("%Y-%m-%d").to_string()))
}
