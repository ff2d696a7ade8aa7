//! Canonical → endpoint parameter translation.
//!
//! Each endpoint declares which canonical parameters it consumes, under which name, and through
//! which transform. Translation builds a fresh map for the endpoint and leaves the caller's
//! parameters untouched.

use fieldmesh_types::{ParameterMap, ParameterRule};
use indexmap::IndexMap;
use serde_json::Value;

use crate::{error::TranslationError, transform::TransformRegistry};

/// Translates canonical parameters according to an endpoint's rules.
pub struct ParameterTranslator<'registry> {
    transforms: &'registry TransformRegistry,
}

impl<'registry> ParameterTranslator<'registry> {
    pub fn new(transforms: &'registry TransformRegistry) -> Self {
        Self { transforms }
    }

    /// Builds the parameter map for `endpoint_id`.
    ///
    /// Rules whose canonical key is absent (or `null`) are skipped unless flagged required, in
    /// which case the endpoint cannot be called and [`TranslationError::MissingParameter`] is
    /// returned. Transforms run on a copy of the canonical value.
    pub fn translate(
        &self,
        endpoint_id: &str,
        canonical: &ParameterMap,
        rules: &IndexMap<String, ParameterRule>,
    ) -> Result<ParameterMap, TranslationError> {
        let mut translated = ParameterMap::new();
        for (canonical_name, rule) in rules {
            let Some(value) = canonical.get(canonical_name).filter(|value| !value.is_null()) else {
                if rule.required {
                    return Err(TranslationError::MissingParameter {
                        endpoint: endpoint_id.to_string(),
                        parameter: canonical_name.clone(),
                    });
                }
                continue;
            };

            let value = self.translate_value(endpoint_id, canonical_name, rule, value)?;
            translated.insert(rule.target_for(canonical_name).to_string(), value);
        }
        Ok(translated)
    }

    fn translate_value(&self, endpoint_id: &str, canonical_name: &str, rule: &ParameterRule, value: &Value) -> Result<Value, TranslationError> {
        let Some(transform_name) = rule.transform.as_deref() else {
            return Ok(value.clone());
        };
        self.transforms
            .apply(transform_name, value)
            .map_err(|source| TranslationError::Transform {
                endpoint: endpoint_id.to_string(),
                parameter: canonical_name.to_string(),
                source,
            })
    }
}
