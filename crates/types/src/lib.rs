//! Shared type definitions for the fieldmesh engine and CLI.
//!
//! - `plan`: configuration documents (endpoint descriptors, resolution plans, settings)
//! - `raw`: the tagged raw payload shape returned by provider gateways
//! - `record`: per-call resolution output (`ResolvedRecord`, `MissingFields`)

pub mod plan;
pub mod raw;
pub mod record;

pub use plan::{
    ChainEntry, DerivedField, EndpointDescriptor, EndpointId, EngineDocument, EngineSettings, EntityPlan, FieldPath, KeyValueColumns,
    LogicalField, ParameterRule, PayloadLayout, ProviderId, ResolutionPlan,
};
pub use raw::{RawResult, UnsupportedShape};
pub use record::{MissingFields, ResolvedRecord};

/// Canonical or translated parameter map passed between caller, translator, and gateway.
pub type ParameterMap = serde_json::Map<String, serde_json::Value>;
