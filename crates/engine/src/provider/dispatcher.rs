use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use fieldmesh_types::{ParameterMap, ProviderId, RawResult};
use serde_json::Value;
use tracing::{debug, warn};

use super::ProviderGateway;
use crate::error::ProviderError;

/// Client for a single external provider.
///
/// Clients return the provider's payload as JSON; the dispatcher owns the conversion into
/// [`RawResult`] so every client gets the same shape handling.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn call(&self, endpoint_id: &str, params: &ParameterMap) -> Result<Value, ProviderError>;
}

/// Gateway that routes each fetch to the client registered for its provider id.
#[derive(Default)]
pub struct ProviderDispatcher {
    clients: HashMap<ProviderId, Arc<dyn ProviderClient>>,
}

impl fmt::Debug for ProviderDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut providers: Vec<&str> = self.clients.keys().map(String::as_str).collect();
        providers.sort_unstable();
        f.debug_struct("ProviderDispatcher").field("providers", &providers).finish()
    }
}

impl ProviderDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `client` for `provider_id`, replacing any previous client.
    pub fn register(&mut self, provider_id: impl Into<ProviderId>, client: Arc<dyn ProviderClient>) -> &mut Self {
        self.clients.insert(provider_id.into(), client);
        self
    }

    pub fn with_client(mut self, provider_id: impl Into<ProviderId>, client: Arc<dyn ProviderClient>) -> Self {
        self.register(provider_id, client);
        self
    }

    pub fn has_provider(&self, provider_id: &str) -> bool {
        self.clients.contains_key(provider_id)
    }
}

#[async_trait]
impl ProviderGateway for ProviderDispatcher {
    async fn fetch(&self, provider_id: &str, endpoint_id: &str, params: &ParameterMap) -> Result<RawResult, ProviderError> {
        let Some(client) = self.clients.get(provider_id) else {
            warn!(provider_id = %provider_id, endpoint_id = %endpoint_id, "no client registered for provider");
            return Err(ProviderError::unsupported(provider_id, endpoint_id));
        };

        let payload = client.call(endpoint_id, params).await?;
        let raw = RawResult::from_json(payload).map_err(|error| ProviderError::unavailable(provider_id, endpoint_id, error.to_string()))?;
        debug!(
            provider_id = %provider_id,
            endpoint_id = %endpoint_id,
            shape = raw.shape_name(),
            row_count = raw.row_count(),
            "provider payload normalized"
        );
        Ok(raw)
    }
}
