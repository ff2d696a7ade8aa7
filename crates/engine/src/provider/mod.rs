//! Provider gateway abstraction.
//!
//! Modules:
//! - `dispatcher`: Routes endpoint calls to per-provider clients and normalizes their payloads
//! - `fixture`: Scripted in-memory gateway used by tests and the `resolve --fixtures` command
//! - `null`: Gateway that serves nothing

mod dispatcher;
mod fixture;
mod null;

pub use dispatcher::{ProviderClient, ProviderDispatcher};
pub use fixture::{FixtureCall, FixtureGateway, FixtureResponse};
pub use null::NullGateway;

use async_trait::async_trait;
use fieldmesh_types::{ParameterMap, RawResult};

use crate::error::ProviderError;

/// The one seam between the resolver and external data providers.
///
/// Implementations must be safe to call concurrently; the resolver issues independent fetches of
/// the same depth in parallel. Every failure is reported as a [`ProviderError`] and never panics.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    async fn fetch(&self, provider_id: &str, endpoint_id: &str, params: &ParameterMap) -> Result<RawResult, ProviderError>;
}
