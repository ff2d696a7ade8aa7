//! Strongly typed configuration schema for endpoints and resolution plans.
//!
//! Every map preserves authoring order (via `IndexMap`) so that plans evaluate fields and
//! endpoints in the sequence they were written, and diagnostics list them the same way.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::RawResult;

/// Canonical, provider-independent field name on the target entity.
pub type LogicalField = String;
/// Identifier of a single endpoint descriptor.
pub type EndpointId = String;
/// Identifier of an external data provider.
pub type ProviderId = String;

/// Locates a logical field inside a raw provider response.
///
/// A flat key addresses a column (row tables) or a top-level key (nested maps). A dot-separated
/// path walks nested maps one key per segment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Non-empty dot-separated segments of the path.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.').filter(|segment| !segment.is_empty())
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&str> for FieldPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for FieldPath {
    fn from(path: String) -> Self {
        Self(path)
    }
}

/// Translation rule for one canonical parameter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ParameterRule {
    /// Parameter name the endpoint expects. Defaults to the canonical name.
    #[serde(default)]
    pub target: Option<String>,
    /// Named transform applied to the canonical value before it is sent.
    #[serde(default)]
    pub transform: Option<String>,
    /// When true, an absent canonical value makes the endpoint unusable for this call.
    #[serde(default)]
    pub required: bool,
}

impl ParameterRule {
    /// Returns the endpoint-side parameter name for `canonical_name`.
    pub fn target_for<'a>(&'a self, canonical_name: &'a str) -> &'a str {
        self.target.as_deref().unwrap_or(canonical_name)
    }
}

/// Static description of one provider endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EndpointDescriptor {
    /// Endpoint identifier. Filled from the surrounding map key when omitted.
    #[serde(default)]
    pub id: EndpointId,
    /// Provider that serves this endpoint.
    pub provider: ProviderId,
    /// Optional descriptive copy surfaced by `fieldmesh validate`.
    #[serde(default)]
    pub description: Option<String>,
    /// Canonical parameter name → translation rule, in authoring order.
    #[serde(default)]
    pub params: IndexMap<String, ParameterRule>,
    /// Logical fields this endpoint can satisfy and where to find them.
    #[serde(default)]
    pub fields: IndexMap<LogicalField, FieldPath>,
    /// Optional named value transform per logical field.
    #[serde(default)]
    pub transforms: IndexMap<LogicalField, String>,
    /// How the endpoint lays out its payload.
    #[serde(default)]
    pub layout: PayloadLayout,
    /// Column names read when `layout` is `key_value`.
    #[serde(default)]
    pub key_value: KeyValueColumns,
}

impl EndpointDescriptor {
    pub fn supports(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Reshapes a fetched payload so field paths address it the way this descriptor declares.
    ///
    /// Key/value tables are pivoted into one map; every other layout passes through unchanged.
    pub fn shape_payload(&self, raw: RawResult) -> RawResult {
        match self.layout {
            PayloadLayout::Columns => raw,
            PayloadLayout::KeyValue => raw.pivot_key_value(&self.key_value.key, &self.key_value.value),
        }
    }
}

/// Payload layout of an endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PayloadLayout {
    /// One column per field; tables are read from their first row.
    #[default]
    Columns,
    /// One row per field: a key column names the field and a value column holds it.
    KeyValue,
}

/// Column names of a key/value table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyValueColumns {
    #[serde(default = "default_key_column")]
    pub key: String,
    #[serde(default = "default_value_column")]
    pub value: String,
}

impl Default for KeyValueColumns {
    fn default() -> Self {
        Self {
            key: default_key_column(),
            value: default_value_column(),
        }
    }
}

fn default_key_column() -> String {
    "item".into()
}

fn default_value_column() -> String {
    "value".into()
}

/// One step in a field's fallback chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChainEntry {
    /// Endpoint consulted at this position of the chain.
    pub endpoint: EndpointId,
    /// Extraction path. Falls back to the endpoint's field map when omitted.
    #[serde(default)]
    pub path: Option<FieldPath>,
    /// Named value transform. Falls back to the endpoint's per-field transform when omitted.
    #[serde(default)]
    pub transform: Option<String>,
}

impl ChainEntry {
    pub fn new(endpoint: impl Into<String>, path: impl Into<FieldPath>) -> Self {
        Self {
            endpoint: endpoint.into(),
            path: Some(path.into()),
            transform: None,
        }
    }

    pub fn with_transform(mut self, transform: impl Into<String>) -> Self {
        self.transform = Some(transform.into());
        self
    }
}

/// Describes which endpoints to consult, in which order, for which fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ResolutionPlan {
    /// Endpoints tried in one fixed order until every declared field is filled.
    GlobalChain {
        endpoints: Vec<EndpointId>,
        fields: Vec<LogicalField>,
    },
    /// Each field carries its own ordered fallback chain.
    PerFieldChain { fields: IndexMap<LogicalField, Vec<ChainEntry>> },
}

impl ResolutionPlan {
    /// Fields the plan promises to attempt, in authoring order.
    pub fn declared_fields(&self) -> Vec<&str> {
        match self {
            ResolutionPlan::GlobalChain { fields, .. } => fields.iter().map(String::as_str).collect(),
            ResolutionPlan::PerFieldChain { fields } => fields.keys().map(String::as_str).collect(),
        }
    }

    /// Distinct endpoint identifiers referenced anywhere in the plan, in first-seen order.
    pub fn referenced_endpoints(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        match self {
            ResolutionPlan::GlobalChain { endpoints, .. } => {
                for endpoint_id in endpoints {
                    if !seen.contains(&endpoint_id.as_str()) {
                        seen.push(endpoint_id.as_str());
                    }
                }
            }
            ResolutionPlan::PerFieldChain { fields } => {
                for entry in fields.values().flatten() {
                    if !seen.contains(&entry.endpoint.as_str()) {
                        seen.push(entry.endpoint.as_str());
                    }
                }
            }
        }
        seen
    }
}

/// Field computed from canonical parameters or a literal before any provider is consulted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DerivedField {
    /// Canonical parameter whose value seeds the field.
    #[serde(default)]
    pub from_param: Option<String>,
    /// Literal value for the field.
    #[serde(default)]
    pub value: Option<JsonValue>,
    /// Named transform applied to the seed value.
    #[serde(default)]
    pub transform: Option<String>,
}

/// Resolution configuration for one entity type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityPlan {
    #[serde(default)]
    pub description: Option<String>,
    pub plan: ResolutionPlan,
    #[serde(default)]
    pub derived: IndexMap<LogicalField, DerivedField>,
}

/// Engine-wide tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineSettings {
    /// Upper bound on fetches in flight for one depth of one `resolve()` call.
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
    /// Per-fetch timeout in milliseconds; no timeout when absent.
    #[serde(default)]
    pub fetch_timeout_ms: Option<u64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_max_concurrent_fetches(),
            fetch_timeout_ms: None,
        }
    }
}

fn default_max_concurrent_fetches() -> usize {
    4
}

/// Top-level configuration document: settings, endpoint descriptors, and entity plans.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EngineDocument {
    #[serde(default)]
    pub settings: EngineSettings,
    #[serde(default)]
    pub endpoints: IndexMap<EndpointId, EndpointDescriptor>,
    #[serde(default)]
    pub entities: IndexMap<String, EntityPlan>,
}
