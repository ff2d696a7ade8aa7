//! Resolution output containers.

use indexmap::{IndexMap, IndexSet, map::Entry};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::LogicalField;

/// Logical field → resolved value, in resolution order.
///
/// Values are write-once: [`ResolvedRecord::insert_if_absent`] never replaces an existing value and
/// the record exposes no mutable access to stored values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedRecord {
    values: IndexMap<LogicalField, Value>,
}

impl ResolvedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` for `field` unless the field already holds a value.
    ///
    /// Returns true when the value was stored.
    pub fn insert_if_absent(&mut self, field: impl Into<LogicalField>, value: Value) -> bool {
        match self.values.entry(field.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(field, value)| (field.as_str(), value))
    }

    /// Consumes the record into a JSON object suitable for persistence collaborators.
    pub fn into_json_map(self) -> serde_json::Map<String, Value> {
        self.values.into_iter().collect()
    }
}

/// Logical fields that no source resolved, in plan order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MissingFields {
    fields: IndexSet<LogicalField>,
}

impl MissingFields {
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }
}

impl FromIterator<LogicalField> for MissingFields {
    fn from_iter<I: IntoIterator<Item = LogicalField>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
