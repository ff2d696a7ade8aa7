//! Per-call resolution output and diagnostics.

use fieldmesh_types::{EndpointId, LogicalField, MissingFields, ProviderId, ResolvedRecord};
use indexmap::IndexMap;
use serde::Serialize;

use crate::error::ProviderErrorKind;

/// Result of one `resolve()` call.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub entity_type: String,
    pub record: ResolvedRecord,
    pub missing: MissingFields,
    pub report: ResolutionReport,
}

impl Resolution {
    /// True when every declared field resolved.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn cancelled(&self) -> bool {
        self.report.cancelled
    }
}

/// What happened to one endpoint during a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchOutcome {
    /// The gateway returned a payload.
    Fetched { row_count: usize },
    /// The gateway reported an error.
    Failed { kind: ProviderErrorKind, message: String },
    /// Parameters could not be translated; the gateway was never called.
    Skipped { reason: String },
}

/// One endpoint consulted during a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchRecord {
    pub endpoint: EndpointId,
    pub provider: ProviderId,
    /// Chain position (per-field plans) or chain index (global plans) that needed the endpoint.
    pub depth: usize,
    pub elapsed_ms: u64,
    #[serde(flatten)]
    pub outcome: FetchOutcome,
}

impl FetchRecord {
    /// True when the gateway was actually invoked.
    pub fn reached_gateway(&self) -> bool {
        !matches!(self.outcome, FetchOutcome::Skipped { .. })
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, FetchOutcome::Fetched { .. })
    }
}

/// Where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldSource {
    Derived,
    Endpoint { endpoint: EndpointId, depth: usize },
}

/// Diagnostics collected while resolving one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionReport {
    pub fetches: Vec<FetchRecord>,
    pub sources: IndexMap<LogicalField, FieldSource>,
    /// Number of depths (or chain steps) evaluated before the call finished.
    pub depth_reached: usize,
    pub cancelled: bool,
}

impl ResolutionReport {
    /// Gateway invocations for `endpoint_id`; skipped translations are not counted.
    pub fn fetch_count(&self, endpoint_id: &str) -> usize {
        self.fetches
            .iter()
            .filter(|fetch| fetch.endpoint == endpoint_id && fetch.reached_gateway())
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &FetchRecord> {
        self.fetches.iter().filter(|fetch| !fetch.succeeded())
    }

    pub fn source_of(&self, field: &str) -> Option<&FieldSource> {
        self.sources.get(field)
    }
}
