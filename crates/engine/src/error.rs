//! Error taxonomy for the resolution engine.
//!
//! Provider, translation, and extraction errors are recovered inside the resolver loop and only
//! ever surface through the resolution report. [`PlanError`] and [`ConfigError`] are load-time
//! failures; [`ResolveError`] covers caller mistakes at the `resolve()` boundary.

use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a failed provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    Unavailable,
    Unauthenticated,
    UnsupportedEndpoint,
    Timeout,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderErrorKind::Unavailable => formatter.write_str("unavailable"),
            ProviderErrorKind::Unauthenticated => formatter.write_str("unauthenticated"),
            ProviderErrorKind::UnsupportedEndpoint => formatter.write_str("unsupported endpoint"),
            ProviderErrorKind::Timeout => formatter.write_str("timed out"),
        }
    }
}

/// Failure reported by a provider gateway for one endpoint call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("provider '{provider}' endpoint '{endpoint}' {kind}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub provider: String,
    pub endpoint: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, provider: impl Into<String>, endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            provider: provider.into(),
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn unavailable(provider: impl Into<String>, endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Unavailable, provider, endpoint, message)
    }

    pub fn unsupported(provider: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::new(
            ProviderErrorKind::UnsupportedEndpoint,
            provider,
            endpoint,
            "endpoint is not served by this gateway",
        )
    }

    pub fn timeout(provider: impl Into<String>, endpoint: impl Into<String>, timeout_ms: u128) -> Self {
        Self::new(ProviderErrorKind::Timeout, provider, endpoint, format!("no response after {timeout_ms}ms"))
    }
}

/// Failure raised by a value or parameter transform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("unknown transform '{name}'")]
    Unknown { name: String },

    #[error("transform '{name}' expects {expected}, got {found}")]
    InvalidInput { name: String, expected: String, found: String },
}

/// Failure translating canonical parameters for one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslationError {
    #[error("endpoint '{endpoint}' requires parameter '{parameter}'")]
    MissingParameter { endpoint: String, parameter: String },

    #[error("endpoint '{endpoint}' parameter '{parameter}' could not be transformed: {source}")]
    Transform {
        endpoint: String,
        parameter: String,
        #[source]
        source: TransformError,
    },
}

/// Failure extracting one field from one endpoint's raw result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("field '{field}' from endpoint '{endpoint}': {source}")]
pub struct ExtractionError {
    pub field: String,
    pub endpoint: String,
    #[source]
    pub source: TransformError,
}

/// A resolution plan that cannot be executed against the loaded endpoint registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("endpoint '{key}' declares mismatched id '{declared}'")]
    EndpointIdMismatch { key: String, declared: String },

    #[error("entity '{entity}' references unknown endpoint '{endpoint}'")]
    UnknownEndpoint { entity: String, endpoint: String },

    #[error("{context} references unknown transform '{name}'")]
    UnknownTransform { context: String, name: String },

    #[error("entity '{entity}' declares no fields")]
    EmptyPlan { entity: String },

    #[error("entity '{entity}' field '{field}' has an empty fallback chain")]
    EmptyChain { entity: String, field: String },

    #[error("entity '{entity}' field '{field}' has no path for endpoint '{endpoint}'")]
    MissingPath { entity: String, field: String, endpoint: String },

    #[error("entity '{entity}' field '{field}' is not supplied by any endpoint in the chain")]
    UncoveredField { entity: String, field: String },

    #[error("entity '{entity}' derived field '{field}': {message}")]
    InvalidDerivedField { entity: String, field: String, message: String },
}

/// Failure loading engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read engine config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse engine config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid engine settings: {message}")]
    InvalidSettings { message: String },

    #[error("plan misconfiguration: {0}")]
    Plan(#[from] PlanError),

    #[error("invalid fixture for endpoint '{endpoint}': {message}")]
    Fixture { endpoint: String, message: String },
}

/// Failure at the `resolve()` boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("no resolution plan configured for entity type '{entity}'")]
    UnknownEntity { entity: String },
}
