//! The generic resolver.
//!
//! A [`Resolver`] is parameterized entirely by configuration: the compiled plan for the requested
//! entity type decides which endpoints to consult and in which order. Every `resolve()` call owns
//! its endpoint cache, record, and pending set; nothing is shared between concurrent calls except
//! the immutable configuration and the injected gateway.
//!
//! Modules:
//! - `batched`: priority-batched evaluation of per-field fallback chains
//! - `global`: fixed endpoint-order evaluation
//! - `cache`: per-call endpoint memoization and bounded concurrent fetching
//! - `report`: resolution output and diagnostics

mod batched;
mod cache;
mod global;
mod report;

pub use report::{FetchOutcome, FetchRecord, FieldSource, Resolution, ResolutionReport};

use std::{sync::Arc, time::Duration};

use fieldmesh_types::{EngineSettings, LogicalField, MissingFields, ParameterMap, RawResult, ResolvedRecord};
use indexmap::IndexSet;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::EngineConfig,
    error::{ExtractionError, ResolveError},
    extract::{extract, is_missing, normalize},
    plan::{CompiledDerivation, CompiledEntry, CompiledPlan, CompiledStrategy, DerivedSource},
    provider::ProviderGateway,
};
use cache::{BatchFetcher, BatchOutcome, EndpointCache};

/// Runtime knobs derived from [`EngineSettings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverSettings {
    pub max_concurrent_fetches: usize,
    pub fetch_timeout: Option<Duration>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self::from(&EngineSettings::default())
    }
}

impl From<&EngineSettings> for ResolverSettings {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            max_concurrent_fetches: settings.max_concurrent_fetches.max(1),
            fetch_timeout: settings.fetch_timeout_ms.map(Duration::from_millis),
        }
    }
}

/// Resolves entity fields from configured providers.
pub struct Resolver {
    config: EngineConfig,
    gateway: Arc<dyn ProviderGateway>,
    settings: ResolverSettings,
}

impl Resolver {
    pub fn new(config: EngineConfig, gateway: Arc<dyn ProviderGateway>) -> Self {
        let settings = ResolverSettings::from(config.settings());
        Self { config, gateway, settings }
    }

    /// Overrides the settings taken from configuration.
    pub fn with_settings(mut self, settings: ResolverSettings) -> Self {
        self.settings = ResolverSettings {
            max_concurrent_fetches: settings.max_concurrent_fetches.max(1),
            ..settings
        };
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Resolves every declared field of `entity_type` from `params`.
    ///
    /// Provider failures, missing parameters, and extraction failures never fail the call; they
    /// leave fields in [`Resolution::missing`]. The only error is an unconfigured entity type.
    pub async fn resolve(&self, entity_type: &str, params: &ParameterMap) -> Result<Resolution, ResolveError> {
        self.resolve_with_cancellation(entity_type, params, &CancellationToken::new()).await
    }

    /// Like [`Resolver::resolve`], but stops early when `token` is cancelled.
    ///
    /// A cancelled call still returns `Ok` with the partial record, the remaining missing fields,
    /// and `report.cancelled` set.
    pub async fn resolve_with_cancellation(
        &self,
        entity_type: &str,
        params: &ParameterMap,
        token: &CancellationToken,
    ) -> Result<Resolution, ResolveError> {
        let plan = self.config.plans().get(entity_type).ok_or_else(|| ResolveError::UnknownEntity {
            entity: entity_type.to_string(),
        })?;
        debug!(
            entity_type = %entity_type,
            field_count = plan.declared_fields().len(),
            max_depth = plan.max_depth(),
            "resolution started"
        );

        let mut state = CallState::new(plan);
        state.apply_derived(params);

        let fetcher = BatchFetcher {
            gateway: self.gateway.as_ref(),
            registry: self.config.registry(),
            transforms: self.config.transforms(),
            settings: &self.settings,
            params,
            token,
        };
        let outcome = match plan.strategy() {
            CompiledStrategy::PerField { chains } => batched::run(&fetcher, &mut state, chains).await,
            CompiledStrategy::Global { steps } => global::run(&fetcher, &mut state, steps).await,
        };
        if outcome == BatchOutcome::Cancelled {
            state.report.cancelled = true;
        }

        Ok(state.finish(entity_type))
    }
}

/// Mutable state of one `resolve()` call.
struct CallState<'a> {
    plan: &'a CompiledPlan,
    record: ResolvedRecord,
    pending: IndexSet<LogicalField>,
    cache: EndpointCache,
    report: ResolutionReport,
}

impl<'a> CallState<'a> {
    fn new(plan: &'a CompiledPlan) -> Self {
        Self {
            plan,
            record: ResolvedRecord::new(),
            pending: plan.declared_fields().iter().cloned().collect(),
            cache: EndpointCache::default(),
            report: ResolutionReport::default(),
        }
    }

    fn is_pending(&self, field: &str) -> bool {
        self.pending.contains(field)
    }

    /// Moves `field` from pending into the record. Only pending fields are ever written, so the
    /// record and the pending set stay disjoint.
    fn commit(&mut self, field: &str, value: Value, source: FieldSource) -> bool {
        if !self.pending.shift_remove(field) {
            return false;
        }
        let stored = self.record.insert_if_absent(field, value);
        if stored {
            self.report.sources.insert(field.to_string(), source);
        }
        stored
    }

    /// Writes derived fields before any provider is consulted.
    fn apply_derived(&mut self, params: &ParameterMap) {
        let plan = self.plan;
        for (field, derivation) in plan.derived() {
            if !self.is_pending(field) {
                continue;
            }
            if let Some(value) = derive_value(field, derivation, params) {
                self.commit(field, value, FieldSource::Derived);
            }
        }
    }

    /// Extracts `field` from a cached payload and commits it when present.
    fn try_resolve(&mut self, field: &str, entry: &CompiledEntry, raw: &RawResult, depth: usize) -> bool {
        let Some(value) = evaluate_entry(field, entry, raw) else {
            return false;
        };
        self.commit(
            field,
            value,
            FieldSource::Endpoint {
                endpoint: entry.endpoint.clone(),
                depth,
            },
        )
    }

    fn finish(self, entity_type: &str) -> Resolution {
        let missing: MissingFields = self.pending.into_iter().collect();
        info!(
            entity_type = %entity_type,
            resolved_count = self.record.len(),
            missing_count = missing.len(),
            fetch_count = self.report.fetches.iter().filter(|fetch| fetch.reached_gateway()).count(),
            cancelled = self.report.cancelled,
            "resolution finished"
        );
        if !missing.is_empty() {
            warn!(
                entity_type = %entity_type,
                missing = ?missing.iter().collect::<Vec<_>>(),
                "fields left unresolved"
            );
        }
        Resolution {
            entity_type: entity_type.to_string(),
            record: self.record,
            missing,
            report: self.report,
        }
    }
}

fn derive_value(field: &str, derivation: &CompiledDerivation, params: &ParameterMap) -> Option<Value> {
    let seed = match &derivation.source {
        DerivedSource::Param(name) => params.get(name).filter(|value| !is_missing(value))?.clone(),
        DerivedSource::Literal(value) => value.clone(),
    };
    let value = match &derivation.transform {
        Some(transform) => match transform.apply(&seed) {
            Ok(value) => value,
            Err(error) => {
                warn!(field = %field, transform = transform.name(), error = %error, "derived field transform failed");
                return None;
            }
        },
        None => seed,
    };
    normalize(&value)
}

/// Extracts and transforms one chain entry; `None` when the value is missing or the transform
/// fails for this (field, endpoint) pair.
fn evaluate_entry(field: &str, entry: &CompiledEntry, raw: &RawResult) -> Option<Value> {
    let value = extract(raw, &entry.path)?;
    let Some(transform) = &entry.transform else {
        return Some(value);
    };
    match transform.apply(&value) {
        Ok(transformed) => normalize(&transformed),
        Err(source) => {
            let error = ExtractionError {
                field: field.to_string(),
                endpoint: entry.endpoint.clone(),
                source,
            };
            warn!(field = %field, endpoint = %entry.endpoint, error = %error, "extraction failed");
            None
        }
    }
}
