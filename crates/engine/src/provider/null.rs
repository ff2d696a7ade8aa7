use async_trait::async_trait;
use fieldmesh_types::{ParameterMap, RawResult};

use super::ProviderGateway;
use crate::error::ProviderError;

/// Gateway that rejects every endpoint; all fields resolve as missing.
pub struct NullGateway;

#[async_trait]
impl ProviderGateway for NullGateway {
    async fn fetch(&self, provider_id: &str, endpoint_id: &str, _params: &ParameterMap) -> Result<RawResult, ProviderError> {
        Err(ProviderError::unsupported(provider_id, endpoint_id))
    }
}
