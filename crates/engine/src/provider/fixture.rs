//! Scripted in-memory gateway.
//!
//! Responses are keyed by endpoint id and may be fixed or computed from the translated parameters.
//! Every call is recorded so callers can assert how often an endpoint was consulted and with
//! which parameters; the gateway also tracks how many fetches were in flight at once.

use std::{
    collections::HashMap,
    fmt,
    path::Path,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use fieldmesh_types::{EndpointId, ParameterMap, RawResult};
use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Value};
use tracing::debug;

use super::ProviderGateway;
use crate::error::{ConfigError, ProviderError, ProviderErrorKind};

/// Scripted outcome for one endpoint call.
#[derive(Debug, Clone, PartialEq)]
pub enum FixtureResponse {
    Rows(Vec<JsonMap<String, Value>>),
    Map(JsonMap<String, Value>),
    Error(ProviderErrorKind),
}

impl FixtureResponse {
    /// Reads a fixture entry: `{"error": <kind>}` scripts a failure, any other object or array of
    /// objects is served as the raw payload.
    pub fn from_json(endpoint_id: &str, value: Value) -> Result<Self, ConfigError> {
        if let Some(kind) = value.as_object().filter(|map| map.len() == 1).and_then(|map| map.get("error")) {
            let kind = serde_json::from_value::<ProviderErrorKind>(kind.clone()).map_err(|error| ConfigError::Fixture {
                endpoint: endpoint_id.to_string(),
                message: error.to_string(),
            })?;
            return Ok(FixtureResponse::Error(kind));
        }
        match RawResult::from_json(value) {
            Ok(RawResult::Rows(rows)) => Ok(FixtureResponse::Rows(rows)),
            Ok(RawResult::Map(map)) => Ok(FixtureResponse::Map(map)),
            Err(error) => Err(ConfigError::Fixture {
                endpoint: endpoint_id.to_string(),
                message: error.to_string(),
            }),
        }
    }

    fn into_result(self, provider_id: &str, endpoint_id: &str) -> Result<RawResult, ProviderError> {
        match self {
            FixtureResponse::Rows(rows) => Ok(RawResult::Rows(rows)),
            FixtureResponse::Map(map) => Ok(RawResult::Map(map)),
            FixtureResponse::Error(kind) => Err(ProviderError::new(kind, provider_id, endpoint_id, "scripted failure")),
        }
    }
}

/// One recorded gateway invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureCall {
    pub provider: String,
    pub endpoint: EndpointId,
    pub params: ParameterMap,
}

type Responder = Arc<dyn Fn(&ParameterMap) -> FixtureResponse + Send + Sync>;

#[derive(Clone)]
struct Script {
    responder: Responder,
    delay: Option<Duration>,
}

/// In-memory [`ProviderGateway`] driven by scripted responses.
#[derive(Default)]
pub struct FixtureGateway {
    scripts: HashMap<EndpointId, Script>,
    default_delay: Option<Duration>,
    calls: Mutex<Vec<FixtureCall>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl fmt::Debug for FixtureGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut endpoints: Vec<&str> = self.scripts.keys().map(String::as_str).collect();
        endpoints.sort_unstable();
        f.debug_struct("FixtureGateway")
            .field("endpoints", &endpoints)
            .field("default_delay", &self.default_delay)
            .finish()
    }
}

impl FixtureGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a fixture document mapping endpoint ids to raw payloads or `{"error": <kind>}`.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let entries: IndexMap<EndpointId, Value> = serde_yaml::from_str(content)?;
        let mut gateway = Self::new();
        for (endpoint_id, value) in entries {
            let response = FixtureResponse::from_json(&endpoint_id, value)?;
            gateway.insert_response(endpoint_id, response);
        }
        Ok(gateway)
    }

    /// Reads a fixture document from disk (YAML or JSON).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn with_response(mut self, endpoint_id: impl Into<EndpointId>, response: FixtureResponse) -> Self {
        self.insert_response(endpoint_id, response);
        self
    }

    /// Scripts a response computed from the translated parameters of each call.
    pub fn with_responder<F>(mut self, endpoint_id: impl Into<EndpointId>, responder: F) -> Self
    where
        F: Fn(&ParameterMap) -> FixtureResponse + Send + Sync + 'static,
    {
        self.scripts.insert(
            endpoint_id.into(),
            Script {
                responder: Arc::new(responder),
                delay: None,
            },
        );
        self
    }

    /// Delays every call to `endpoint_id`; the endpoint must already be scripted.
    pub fn with_endpoint_delay(mut self, endpoint_id: &str, delay: Duration) -> Self {
        if let Some(script) = self.scripts.get_mut(endpoint_id) {
            script.delay = Some(delay);
        }
        self
    }

    /// Delays every call without an endpoint-specific delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.default_delay = Some(delay);
        self
    }

    fn insert_response(&mut self, endpoint_id: impl Into<EndpointId>, response: FixtureResponse) {
        self.scripts.insert(
            endpoint_id.into(),
            Script {
                responder: Arc::new(move |_| response.clone()),
                delay: None,
            },
        );
    }

    /// Every call received so far, in arrival order.
    pub fn calls(&self) -> Vec<FixtureCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn fetch_count(&self, endpoint_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|call| call.endpoint == endpoint_id)
            .count()
    }

    pub fn total_fetches(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Highest number of calls observed in flight at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight counter even when the fetch future is dropped mid-flight.
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProviderGateway for FixtureGateway {
    async fn fetch(&self, provider_id: &str, endpoint_id: &str, params: &ParameterMap) -> Result<RawResult, ProviderError> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(FixtureCall {
            provider: provider_id.to_string(),
            endpoint: endpoint_id.to_string(),
            params: params.clone(),
        });

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlightGuard(&self.in_flight);
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        let Some(script) = self.scripts.get(endpoint_id).cloned() else {
            debug!(provider_id = %provider_id, endpoint_id = %endpoint_id, "no fixture scripted for endpoint");
            return Err(ProviderError::unsupported(provider_id, endpoint_id));
        };

        if let Some(delay) = script.delay.or(self.default_delay) {
            tokio::time::sleep(delay).await;
        }
        (script.responder)(params).into_result(provider_id, endpoint_id)
    }
}
