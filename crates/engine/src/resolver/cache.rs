//! Per-call endpoint cache and depth-batched fetching.

use std::{collections::HashMap, sync::Arc, time::Instant};

use fieldmesh_types::{EndpointDescriptor, EndpointId, ParameterMap, ProviderId, RawResult};
use futures_util::{StreamExt, stream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    ResolverSettings,
    report::{FetchOutcome, FetchRecord, ResolutionReport},
};
use crate::{
    error::ProviderError,
    plan::EndpointRegistry,
    provider::ProviderGateway,
    transform::TransformRegistry,
    translate::ParameterTranslator,
};

/// Memoized outcome of one endpoint within one call.
#[derive(Debug, Clone)]
pub(crate) enum CacheSlot {
    Ready(Arc<RawResult>),
    Failed,
}

/// Endpoint id → outcome, written at most once per key.
#[derive(Debug, Default)]
pub(crate) struct EndpointCache {
    slots: HashMap<EndpointId, CacheSlot>,
}

impl EndpointCache {
    pub(crate) fn contains(&self, endpoint_id: &str) -> bool {
        self.slots.contains_key(endpoint_id)
    }

    /// Payload for `endpoint_id` when its fetch succeeded.
    pub(crate) fn ready(&self, endpoint_id: &str) -> Option<Arc<RawResult>> {
        match self.slots.get(endpoint_id)? {
            CacheSlot::Ready(raw) => Some(Arc::clone(raw)),
            CacheSlot::Failed => None,
        }
    }

    fn insert(&mut self, endpoint_id: EndpointId, slot: CacheSlot) {
        self.slots.entry(endpoint_id).or_insert(slot);
    }
}

/// Whether a batch ran to its barrier or was cut short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BatchOutcome {
    Completed,
    Cancelled,
}

struct FetchRequest {
    endpoint: EndpointId,
    provider: ProviderId,
    params: ParameterMap,
    descriptor: Arc<EndpointDescriptor>,
}

struct FetchResult {
    request: FetchRequest,
    result: Result<RawResult, ProviderError>,
    elapsed_ms: u64,
}

/// Everything one `resolve()` call needs to issue fetches.
pub(crate) struct BatchFetcher<'a> {
    pub(crate) gateway: &'a dyn ProviderGateway,
    pub(crate) registry: &'a EndpointRegistry,
    pub(crate) transforms: &'a TransformRegistry,
    pub(crate) settings: &'a ResolverSettings,
    pub(crate) params: &'a ParameterMap,
    pub(crate) token: &'a CancellationToken,
}

impl BatchFetcher<'_> {
    /// Fetches every endpoint in `endpoints` that is not cached yet and waits for all of them.
    ///
    /// At most `max_concurrent_fetches` calls are in flight. Translation failures and provider
    /// errors land in the cache as failures; only cancellation stops the batch early.
    pub(crate) async fn fetch_all(
        &self,
        cache: &mut EndpointCache,
        report: &mut ResolutionReport,
        endpoints: &[EndpointId],
        depth: usize,
    ) -> BatchOutcome {
        if self.token.is_cancelled() {
            return BatchOutcome::Cancelled;
        }

        let requests = self.prepare(cache, report, endpoints, depth);
        if requests.is_empty() {
            return BatchOutcome::Completed;
        }
        debug!(depth, fetch_count = requests.len(), "issuing endpoint fetches");

        let gateway = self.gateway;
        let timeout = self.settings.fetch_timeout;
        let mut in_flight = std::pin::pin!(stream::iter(requests)
            .map(|request| async move {
                let started = Instant::now();
                let fetch = gateway.fetch(&request.provider, &request.endpoint, &request.params);
                let result = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, fetch).await {
                        Ok(result) => result,
                        Err(_) => Err(ProviderError::timeout(&request.provider, &request.endpoint, limit.as_millis())),
                    },
                    None => fetch.await,
                };
                FetchResult {
                    request,
                    result,
                    elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                }
            })
            .buffer_unordered(self.settings.max_concurrent_fetches));

        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    debug!(depth, "resolution cancelled with fetches in flight");
                    return BatchOutcome::Cancelled;
                }
                next = in_flight.next() => match next {
                    Some(done) => record_result(cache, report, done, depth),
                    None => break,
                },
            }
        }
        BatchOutcome::Completed
    }

    /// Translates parameters for the uncached endpoints; failures are cached and reported here.
    fn prepare(&self, cache: &mut EndpointCache, report: &mut ResolutionReport, endpoints: &[EndpointId], depth: usize) -> Vec<FetchRequest> {
        let translator = ParameterTranslator::new(self.transforms);
        let mut requests = Vec::with_capacity(endpoints.len());
        for endpoint_id in endpoints {
            if cache.contains(endpoint_id) || requests.iter().any(|request: &FetchRequest| &request.endpoint == endpoint_id) {
                continue;
            }
            let Some(descriptor) = self.registry.get(endpoint_id) else {
                warn!(endpoint = %endpoint_id, "endpoint missing from registry");
                cache.insert(endpoint_id.clone(), CacheSlot::Failed);
                continue;
            };

            match translator.translate(endpoint_id, self.params, &descriptor.params) {
                Ok(params) => requests.push(FetchRequest {
                    endpoint: endpoint_id.clone(),
                    provider: descriptor.provider.clone(),
                    params,
                    descriptor: Arc::clone(descriptor),
                }),
                Err(error) => {
                    warn!(endpoint = %endpoint_id, error = %error, "endpoint skipped");
                    cache.insert(endpoint_id.clone(), CacheSlot::Failed);
                    report.fetches.push(FetchRecord {
                        endpoint: endpoint_id.clone(),
                        provider: descriptor.provider.clone(),
                        depth,
                        elapsed_ms: 0,
                        outcome: FetchOutcome::Skipped { reason: error.to_string() },
                    });
                }
            }
        }
        requests
    }
}

fn record_result(cache: &mut EndpointCache, report: &mut ResolutionReport, done: FetchResult, depth: usize) {
    let FetchResult { request, result, elapsed_ms } = done;
    let (slot, outcome) = match result {
        Ok(raw) => {
            let row_count = raw.row_count();
            info!(
                endpoint = %request.endpoint,
                provider = %request.provider,
                row_count,
                layout = ?request.descriptor.layout,
                elapsed_ms,
                "endpoint fetch completed"
            );
            let raw = request.descriptor.shape_payload(raw);
            (CacheSlot::Ready(Arc::new(raw)), FetchOutcome::Fetched { row_count })
        }
        Err(error) => {
            warn!(
                endpoint = %request.endpoint,
                provider = %request.provider,
                kind = %error.kind,
                error = %error.message,
                "endpoint fetch failed"
            );
            (
                CacheSlot::Failed,
                FetchOutcome::Failed {
                    kind: error.kind,
                    message: error.message,
                },
            )
        }
    };
    cache.insert(request.endpoint.clone(), slot);
    report.fetches.push(FetchRecord {
        endpoint: request.endpoint,
        provider: request.provider,
        depth,
        elapsed_ms,
        outcome,
    });
}
