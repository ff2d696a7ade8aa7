//! Engine configuration loading.
//!
//! One document declares settings, endpoint descriptors, and entity plans. Loading parses the
//! document, builds the endpoint registry, and compiles every plan; any misconfiguration is
//! reported here so that a constructed [`EngineConfig`] is always executable.

use std::{
    env,
    path::{Path, PathBuf},
    sync::Arc,
};

use dirs_next::{config_dir, home_dir};
use fieldmesh_types::{EngineDocument, EngineSettings};
use tracing::debug;

use crate::{
    error::ConfigError,
    plan::{EndpointRegistry, PlanSet},
    transform::TransformRegistry,
};

/// Environment variable overriding the default config location.
pub const CONFIG_PATH_ENV: &str = "FIELDMESH_CONFIG_PATH";

/// Validated, immutable engine configuration shared by resolvers.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    settings: EngineSettings,
    registry: Arc<EndpointRegistry>,
    plans: Arc<PlanSet>,
    transforms: Arc<TransformRegistry>,
}

impl EngineConfig {
    /// Validates `document` against `transforms` and compiles its plans.
    pub fn from_document(document: EngineDocument, transforms: TransformRegistry) -> Result<Self, ConfigError> {
        if document.settings.max_concurrent_fetches == 0 {
            return Err(ConfigError::InvalidSettings {
                message: "max_concurrent_fetches must be at least 1".to_string(),
            });
        }
        if document.settings.fetch_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidSettings {
                message: "fetch_timeout_ms must be positive when set".to_string(),
            });
        }

        let registry = EndpointRegistry::from_descriptors(document.endpoints, &transforms)?;
        let plans = PlanSet::compile(&document.entities, &registry, &transforms)?;
        debug!(
            endpoint_count = registry.len(),
            entity_count = plans.len(),
            max_concurrent_fetches = document.settings.max_concurrent_fetches,
            "engine configuration compiled"
        );

        Ok(Self {
            settings: document.settings,
            registry: Arc::new(registry),
            plans: Arc::new(plans),
            transforms: Arc::new(transforms),
        })
    }

    /// Parses a YAML or JSON document using the built-in transforms.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Self::from_yaml_str_with(content, TransformRegistry::with_builtins())
    }

    /// Parses a YAML or JSON document using a caller-provided transform registry.
    pub fn from_yaml_str_with(content: &str, transforms: TransformRegistry) -> Result<Self, ConfigError> {
        let document: EngineDocument = serde_yaml::from_str(content)?;
        Self::from_document(document, transforms)
    }

    /// Loads configuration from `path` with the built-in transforms.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with(path, TransformRegistry::with_builtins())
    }

    pub fn load_with(path: &Path, transforms: TransformRegistry) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loading engine configuration");
        Self::from_yaml_str_with(&content, transforms)
    }

    /// Loads configuration from [`default_config_path`].
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load(&default_config_path())
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    pub fn plans(&self) -> &PlanSet {
        &self.plans
    }

    pub fn transforms(&self) -> &TransformRegistry {
        &self.transforms
    }
}

/// Get the default path for the engine configuration file.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV)
        && !path.trim().is_empty()
    {
        return expand_tilde(&path);
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fieldmesh")
        .join("engine.yaml")
}

fn expand_tilde(path: &str) -> PathBuf {
    let path = path.trim();
    if path == "~" {
        return home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }
    PathBuf::from(path)
}
