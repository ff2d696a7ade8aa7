//! Endpoint registry and resolution plan compilation.
//!
//! Plans are authored as data ([`EntityPlan`]) and compiled once at load time against the
//! endpoint registry and transform registry. Compilation is where every
//! [`PlanError`] is raised: unknown endpoints, unknown transforms, empty chains, and chain
//! entries without a usable path. A compiled plan carries bound transforms and resolved paths, so
//! the resolver never looks anything up by name at run time.

use std::sync::Arc;

use fieldmesh_types::{DerivedField, EndpointDescriptor, EndpointId, EntityPlan, FieldPath, LogicalField, ResolutionPlan};
use indexmap::IndexMap;
use serde_json::Value;

use crate::{
    error::PlanError,
    transform::{BoundTransform, TransformRegistry},
};

/// Immutable set of endpoint descriptors keyed by endpoint id.
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    endpoints: IndexMap<EndpointId, Arc<EndpointDescriptor>>,
}

impl EndpointRegistry {
    /// Builds the registry, filling descriptor ids from their map keys and checking every
    /// transform name the descriptors mention.
    pub fn from_descriptors(descriptors: IndexMap<EndpointId, EndpointDescriptor>, transforms: &TransformRegistry) -> Result<Self, PlanError> {
        let mut endpoints = IndexMap::with_capacity(descriptors.len());
        for (key, mut descriptor) in descriptors {
            if descriptor.id.is_empty() {
                descriptor.id = key.clone();
            } else if descriptor.id != key {
                return Err(PlanError::EndpointIdMismatch {
                    key,
                    declared: descriptor.id,
                });
            }

            for (parameter, rule) in &descriptor.params {
                if let Some(name) = rule.transform.as_deref() {
                    require_transform(transforms, name, || format!("endpoint '{key}' parameter '{parameter}'"))?;
                }
            }
            for (field, name) in &descriptor.transforms {
                require_transform(transforms, name, || format!("endpoint '{key}' field '{field}'"))?;
            }

            endpoints.insert(key, Arc::new(descriptor));
        }
        Ok(Self { endpoints })
    }

    pub fn get(&self, endpoint_id: &str) -> Option<&Arc<EndpointDescriptor>> {
        self.endpoints.get(endpoint_id)
    }

    pub fn contains(&self, endpoint_id: &str) -> bool {
        self.endpoints.contains_key(endpoint_id)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<EndpointDescriptor>> {
        self.endpoints.values()
    }
}

fn require_transform(transforms: &TransformRegistry, name: &str, context: impl FnOnce() -> String) -> Result<(), PlanError> {
    if transforms.contains(name) {
        Ok(())
    } else {
        Err(PlanError::UnknownTransform {
            context: context(),
            name: name.to_string(),
        })
    }
}

fn bind_transform(transforms: &TransformRegistry, name: Option<&str>, context: impl FnOnce() -> String) -> Result<Option<BoundTransform>, PlanError> {
    let Some(name) = name else {
        return Ok(None);
    };
    transforms.bind(name).map(Some).ok_or_else(|| PlanError::UnknownTransform {
        context: context(),
        name: name.to_string(),
    })
}

/// One resolved extraction step: which endpoint, which path, which transform.
#[derive(Debug, Clone)]
pub struct CompiledEntry {
    pub endpoint: EndpointId,
    pub path: FieldPath,
    pub transform: Option<BoundTransform>,
}

/// One endpoint of a global chain with the declared fields it can supply.
#[derive(Debug, Clone)]
pub struct GlobalStep {
    pub endpoint: EndpointId,
    pub fields: IndexMap<LogicalField, CompiledEntry>,
}

/// Execution strategy of a compiled plan.
#[derive(Debug, Clone)]
pub enum CompiledStrategy {
    /// Endpoints consulted one after another until no field is pending.
    Global { steps: Vec<GlobalStep> },
    /// Priority-batched evaluation of per-field fallback chains.
    PerField { chains: IndexMap<LogicalField, Vec<CompiledEntry>> },
}

/// Seed for a derived field.
#[derive(Debug, Clone)]
pub enum DerivedSource {
    Param(String),
    Literal(Value),
}

/// A derived field ready to evaluate against canonical parameters.
#[derive(Debug, Clone)]
pub struct CompiledDerivation {
    pub source: DerivedSource,
    pub transform: Option<BoundTransform>,
}

/// A validated plan for one entity type.
#[derive(Debug, Clone)]
pub struct CompiledPlan {
    entity_type: String,
    declared_fields: Vec<LogicalField>,
    derived: IndexMap<LogicalField, CompiledDerivation>,
    strategy: CompiledStrategy,
}

impl CompiledPlan {
    /// Validates `entity_plan` against the registries and binds its transforms.
    pub fn compile(
        entity_type: &str,
        entity_plan: &EntityPlan,
        registry: &EndpointRegistry,
        transforms: &TransformRegistry,
    ) -> Result<Self, PlanError> {
        let derived = compile_derived(entity_type, &entity_plan.derived, transforms)?;

        let strategy = match &entity_plan.plan {
            ResolutionPlan::PerFieldChain { fields } => compile_per_field(entity_type, fields, registry, transforms)?,
            ResolutionPlan::GlobalChain { endpoints, fields } => compile_global(entity_type, endpoints, fields, &derived, registry, transforms)?,
        };

        let mut declared_fields: Vec<LogicalField> = entity_plan.plan.declared_fields().into_iter().map(str::to_string).collect();
        for field in derived.keys() {
            if !declared_fields.contains(field) {
                declared_fields.push(field.clone());
            }
        }
        if declared_fields.is_empty() {
            return Err(PlanError::EmptyPlan {
                entity: entity_type.to_string(),
            });
        }

        Ok(Self {
            entity_type: entity_type.to_string(),
            declared_fields,
            derived,
            strategy,
        })
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Every field the plan attempts, in authoring order (chain fields first, then derived-only).
    pub fn declared_fields(&self) -> &[LogicalField] {
        &self.declared_fields
    }

    pub fn derived(&self) -> &IndexMap<LogicalField, CompiledDerivation> {
        &self.derived
    }

    pub fn strategy(&self) -> &CompiledStrategy {
        &self.strategy
    }

    /// Longest fallback chain (per-field) or chain length (global).
    pub fn max_depth(&self) -> usize {
        match &self.strategy {
            CompiledStrategy::Global { steps } => steps.len(),
            CompiledStrategy::PerField { chains } => chains.values().map(Vec::len).max().unwrap_or(0),
        }
    }
}

fn compile_derived(
    entity_type: &str,
    derived: &IndexMap<LogicalField, DerivedField>,
    transforms: &TransformRegistry,
) -> Result<IndexMap<LogicalField, CompiledDerivation>, PlanError> {
    let mut compiled = IndexMap::with_capacity(derived.len());
    for (field, definition) in derived {
        let invalid = |message: &str| PlanError::InvalidDerivedField {
            entity: entity_type.to_string(),
            field: field.clone(),
            message: message.to_string(),
        };
        let source = match (&definition.from_param, &definition.value) {
            (Some(param), None) => DerivedSource::Param(param.clone()),
            (None, Some(value)) => DerivedSource::Literal(value.clone()),
            (Some(_), Some(_)) => return Err(invalid("must declare either from_param or value, not both")),
            (None, None) => return Err(invalid("must declare a source (from_param or value)")),
        };
        let transform = bind_transform(transforms, definition.transform.as_deref(), || {
            format!("entity '{entity_type}' derived field '{field}'")
        })?;
        compiled.insert(field.clone(), CompiledDerivation { source, transform });
    }
    Ok(compiled)
}

fn compile_per_field(
    entity_type: &str,
    fields: &IndexMap<LogicalField, Vec<fieldmesh_types::ChainEntry>>,
    registry: &EndpointRegistry,
    transforms: &TransformRegistry,
) -> Result<CompiledStrategy, PlanError> {
    let mut chains = IndexMap::with_capacity(fields.len());
    for (field, entries) in fields {
        if entries.is_empty() {
            return Err(PlanError::EmptyChain {
                entity: entity_type.to_string(),
                field: field.clone(),
            });
        }

        let mut chain = Vec::with_capacity(entries.len());
        for entry in entries {
            let descriptor = registry.get(&entry.endpoint).ok_or_else(|| PlanError::UnknownEndpoint {
                entity: entity_type.to_string(),
                endpoint: entry.endpoint.clone(),
            })?;

            let path = entry
                .path
                .clone()
                .or_else(|| descriptor.fields.get(field).cloned())
                .filter(|path| !path.is_blank())
                .ok_or_else(|| PlanError::MissingPath {
                    entity: entity_type.to_string(),
                    field: field.clone(),
                    endpoint: entry.endpoint.clone(),
                })?;

            let transform_name = entry.transform.as_deref().or_else(|| descriptor.transforms.get(field).map(String::as_str));
            let transform = bind_transform(transforms, transform_name, || {
                format!("entity '{entity_type}' field '{field}' entry '{}'", entry.endpoint)
            })?;

            chain.push(CompiledEntry {
                endpoint: entry.endpoint.clone(),
                path,
                transform,
            });
        }
        chains.insert(field.clone(), chain);
    }
    Ok(CompiledStrategy::PerField { chains })
}

fn compile_global(
    entity_type: &str,
    endpoints: &[EndpointId],
    fields: &[LogicalField],
    derived: &IndexMap<LogicalField, CompiledDerivation>,
    registry: &EndpointRegistry,
    transforms: &TransformRegistry,
) -> Result<CompiledStrategy, PlanError> {
    let mut steps: Vec<GlobalStep> = Vec::with_capacity(endpoints.len());
    for endpoint_id in endpoints {
        // A repeated id would be a second call to the same endpoint.
        if steps.iter().any(|step| &step.endpoint == endpoint_id) {
            continue;
        }
        let descriptor = registry.get(endpoint_id).ok_or_else(|| PlanError::UnknownEndpoint {
            entity: entity_type.to_string(),
            endpoint: endpoint_id.clone(),
        })?;

        let mut supplied = IndexMap::new();
        for field in fields {
            let Some(path) = descriptor.fields.get(field).filter(|path| !path.is_blank()) else {
                continue;
            };
            let transform = bind_transform(transforms, descriptor.transforms.get(field).map(String::as_str), || {
                format!("endpoint '{endpoint_id}' field '{field}'")
            })?;
            supplied.insert(
                field.clone(),
                CompiledEntry {
                    endpoint: endpoint_id.clone(),
                    path: path.clone(),
                    transform,
                },
            );
        }
        steps.push(GlobalStep {
            endpoint: endpoint_id.clone(),
            fields: supplied,
        });
    }

    for field in fields {
        let covered = steps.iter().any(|step| step.fields.contains_key(field)) || derived.contains_key(field);
        if !covered {
            return Err(PlanError::UncoveredField {
                entity: entity_type.to_string(),
                field: field.clone(),
            });
        }
    }
    Ok(CompiledStrategy::Global { steps })
}

/// Compiled plans keyed by entity type.
#[derive(Debug, Clone, Default)]
pub struct PlanSet {
    plans: IndexMap<String, Arc<CompiledPlan>>,
}

impl PlanSet {
    pub fn compile(
        entities: &IndexMap<String, EntityPlan>,
        registry: &EndpointRegistry,
        transforms: &TransformRegistry,
    ) -> Result<Self, PlanError> {
        let mut plans = IndexMap::with_capacity(entities.len());
        for (entity_type, entity_plan) in entities {
            let compiled = CompiledPlan::compile(entity_type, entity_plan, registry, transforms)?;
            plans.insert(entity_type.clone(), Arc::new(compiled));
        }
        Ok(Self { plans })
    }

    pub fn get(&self, entity_type: &str) -> Option<&Arc<CompiledPlan>> {
        self.plans.get(entity_type)
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.plans.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldmesh_types::{ChainEntry, ParameterRule};
    use indexmap::indexmap;
    use serde_json::json;

    fn descriptor(provider: &str, fields: &[(&str, &str)]) -> EndpointDescriptor {
        EndpointDescriptor {
            id: String::new(),
            provider: provider.into(),
            description: None,
            params: indexmap! { "symbol".to_string() => ParameterRule::default() },
            fields: fields.iter().map(|(field, path)| (field.to_string(), FieldPath::from(*path))).collect(),
            transforms: IndexMap::new(),
            layout: Default::default(),
            key_value: Default::default(),
        }
    }

    fn registry() -> EndpointRegistry {
        let mut xq = descriptor("akshare", &[("name", "org_short_name_cn"), ("list_date", "listed_date")]);
        xq.transforms.insert("list_date".into(), "epoch_millis_to_date".into());
        EndpointRegistry::from_descriptors(
            indexmap! {
                "em".to_string() => descriptor("akshare", &[("code", "股票代码"), ("name", "股票简称")]),
                "xq".to_string() => xq,
            },
            &TransformRegistry::with_builtins(),
        )
        .expect("registry")
    }

    fn per_field(fields: IndexMap<LogicalField, Vec<ChainEntry>>) -> EntityPlan {
        EntityPlan {
            description: None,
            plan: ResolutionPlan::PerFieldChain { fields },
            derived: IndexMap::new(),
        }
    }

    #[test]
    fn registry_fills_ids_from_keys() {
        let registry = registry();
        assert_eq!(registry.get("em").map(|descriptor| descriptor.id.as_str()), Some("em"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn registry_rejects_mismatched_ids_and_unknown_transforms() {
        let transforms = TransformRegistry::with_builtins();
        let mut mismatched = descriptor("akshare", &[]);
        mismatched.id = "other".into();
        let error = EndpointRegistry::from_descriptors(indexmap! { "em".to_string() => mismatched }, &transforms).expect_err("mismatch");
        assert!(matches!(error, PlanError::EndpointIdMismatch { .. }));

        let mut bad_transform = descriptor("akshare", &[]);
        bad_transform.params["symbol"].transform = Some("rot13".into());
        let error = EndpointRegistry::from_descriptors(indexmap! { "em".to_string() => bad_transform }, &transforms).expect_err("unknown");
        assert_eq!(
            error,
            PlanError::UnknownTransform {
                context: "endpoint 'em' parameter 'symbol'".into(),
                name: "rot13".into(),
            }
        );
    }

    #[test]
    fn per_field_entries_inherit_descriptor_paths_and_transforms() {
        let plan = per_field(indexmap! {
            "list_date".to_string() => vec![ChainEntry { endpoint: "xq".into(), path: None, transform: None }],
        });
        let compiled = CompiledPlan::compile("stock_info", &plan, &registry(), &TransformRegistry::with_builtins()).expect("compiled");
        let CompiledStrategy::PerField { chains } = compiled.strategy() else {
            panic!("expected per-field strategy");
        };
        let entry = &chains["list_date"][0];
        assert_eq!(entry.path, FieldPath::from("listed_date"));
        assert_eq!(entry.transform.as_ref().map(BoundTransform::name), Some("epoch_millis_to_date"));
    }

    #[test]
    fn unknown_endpoints_are_misconfigurations() {
        let plan = per_field(indexmap! {
            "name".to_string() => vec![ChainEntry::new("em", "股票简称"), ChainEntry::new("ef", "股票简称")],
        });
        let error = CompiledPlan::compile("stock_info", &plan, &registry(), &TransformRegistry::with_builtins()).expect_err("unknown");
        assert_eq!(
            error,
            PlanError::UnknownEndpoint {
                entity: "stock_info".into(),
                endpoint: "ef".into(),
            }
        );
    }

    #[test]
    fn entries_without_any_path_are_rejected() {
        let plan = per_field(indexmap! {
            "industry".to_string() => vec![ChainEntry { endpoint: "em".into(), path: None, transform: None }],
        });
        let error = CompiledPlan::compile("stock_info", &plan, &registry(), &TransformRegistry::with_builtins()).expect_err("no path");
        assert!(matches!(error, PlanError::MissingPath { ref field, .. } if field == "industry"));

        let empty = per_field(indexmap! { "industry".to_string() => Vec::new() });
        let error = CompiledPlan::compile("stock_info", &empty, &registry(), &TransformRegistry::with_builtins()).expect_err("empty chain");
        assert!(matches!(error, PlanError::EmptyChain { .. }));
    }

    #[test]
    fn global_chain_requires_coverage_and_dedups_endpoints() {
        let transforms = TransformRegistry::with_builtins();
        let plan = EntityPlan {
            description: None,
            plan: ResolutionPlan::GlobalChain {
                endpoints: vec!["em".into(), "xq".into(), "em".into()],
                fields: vec!["code".into(), "name".into(), "list_date".into()],
            },
            derived: IndexMap::new(),
        };
        let compiled = CompiledPlan::compile("stock_info", &plan, &registry(), &transforms).expect("compiled");
        assert_eq!(compiled.max_depth(), 2);

        let uncovered = EntityPlan {
            plan: ResolutionPlan::GlobalChain {
                endpoints: vec!["em".into()],
                fields: vec!["code".into(), "market".into()],
            },
            ..plan.clone()
        };
        let error = CompiledPlan::compile("stock_info", &uncovered, &registry(), &transforms).expect_err("uncovered");
        assert!(matches!(error, PlanError::UncoveredField { ref field, .. } if field == "market"));

        let derived_market = EntityPlan {
            derived: indexmap! {
                "market".to_string() => DerivedField {
                    from_param: Some("symbol".into()),
                    value: None,
                    transform: Some("exchange_of".into()),
                },
            },
            ..uncovered
        };
        let compiled = CompiledPlan::compile("stock_info", &derived_market, &registry(), &transforms).expect("derived covers market");
        assert_eq!(compiled.declared_fields(), ["code".to_string(), "market".to_string()]);
    }

    #[test]
    fn derived_fields_need_exactly_one_source() {
        let transforms = TransformRegistry::with_builtins();
        let mut plan = per_field(indexmap! { "name".to_string() => vec![ChainEntry::new("em", "股票简称")] });
        plan.derived.insert(
            "status".into(),
            DerivedField {
                from_param: Some("symbol".into()),
                value: Some(json!("listed")),
                transform: None,
            },
        );
        let error = CompiledPlan::compile("stock_info", &plan, &registry(), &transforms).expect_err("two sources");
        assert!(matches!(error, PlanError::InvalidDerivedField { ref message, .. } if message.contains("not both")));

        plan.derived.insert("status".into(), DerivedField::default());
        let error = CompiledPlan::compile("stock_info", &plan, &registry(), &transforms).expect_err("no source");
        assert!(matches!(error, PlanError::InvalidDerivedField { ref message, .. } if message.contains("must declare a source")));
    }
}
