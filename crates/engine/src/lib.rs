//! # fieldmesh Engine
//!
//! The fieldmesh engine assembles one normalized record per entity from several heterogeneous
//! data providers. Each provider exposes endpoints with their own parameter names and response
//! shapes; configuration maps canonical parameters onto those endpoints and locates every logical
//! field inside their responses.
//!
//! ## Key Features
//!
//! - **Declarative plans**: per-field fallback chains or a single global endpoint order
//! - **Call minimization**: each endpoint is fetched at most once per `resolve()` call
//! - **Bounded concurrency**: endpoints needed at the same chain depth are fetched together
//! - **Graceful degradation**: provider failures only leave fields missing
//! - **Cancellation**: a cancelled call returns whatever resolved so far
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use fieldmesh_engine::{EngineConfig, FixtureGateway, FixtureResponse, Resolver};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::from_yaml_str(r#"
//! endpoints:
//!   em_info:
//!     provider: akshare
//!     params:
//!       symbol: { required: true }
//!     fields:
//!       name: short_name
//! entities:
//!   stock_info:
//!     plan:
//!       strategy: per_field_chain
//!       fields:
//!         name:
//!           - endpoint: em_info
//! "#)?;
//!
//! let row = json!({"short_name": "X Bank"}).as_object().cloned().unwrap_or_default();
//! let gateway = FixtureGateway::new().with_response("em_info", FixtureResponse::Rows(vec![row]));
//! let resolver = Resolver::new(config, Arc::new(gateway));
//!
//! let params = json!({"symbol": "600000"}).as_object().cloned().unwrap_or_default();
//! let resolution = resolver.resolve("stock_info", &params).await?;
//! assert_eq!(resolution.record.get("name"), Some(&json!("X Bank")));
//! assert!(resolution.missing.is_empty());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **`config`**: document loading and validation
//! - **`plan`**: endpoint registry and plan compilation
//! - **`translate`**: canonical → endpoint parameter translation
//! - **`extract`**: field extraction and missing-value normalization
//! - **`transform`**: named value transforms
//! - **`provider`**: gateway trait, dispatcher, and in-memory gateways
//! - **`resolver`**: the resolution algorithm and its report

pub mod config;
pub mod error;
pub mod extract;
pub mod plan;
pub mod provider;
pub mod resolver;
pub mod transform;
pub mod translate;

// Re-export commonly used types for convenience
pub use config::{CONFIG_PATH_ENV, EngineConfig, default_config_path};
pub use error::{ConfigError, ExtractionError, PlanError, ProviderError, ProviderErrorKind, ResolveError, TransformError, TranslationError};
pub use extract::{extract, map_rows};
pub use plan::{CompiledPlan, EndpointRegistry, PlanSet};
pub use provider::{FixtureGateway, FixtureResponse, NullGateway, ProviderClient, ProviderDispatcher, ProviderGateway};
pub use resolver::{FetchOutcome, FetchRecord, FieldSource, Resolution, ResolutionReport, Resolver, ResolverSettings};
pub use tokio_util::sync::CancellationToken;
pub use transform::{BoundTransform, TransformRegistry};
pub use translate::ParameterTranslator;
