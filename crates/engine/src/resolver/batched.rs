use fieldmesh_types::{EndpointId, LogicalField};
use indexmap::IndexMap;
use tracing::debug;

use super::{
    CallState,
    cache::{BatchFetcher, BatchOutcome},
};
use crate::plan::CompiledEntry;

/// Evaluates per-field chains one depth at a time.
///
/// At each depth the distinct endpoints needed by still-pending fields are fetched together, then
/// every pending field with an entry at that depth is evaluated against the cache. A field never
/// looks at depth `n + 1` while its depth `n` source could still answer, and an endpoint shared by
/// several fields is fetched once per call.
pub(super) async fn run(fetcher: &BatchFetcher<'_>, state: &mut CallState<'_>, chains: &IndexMap<LogicalField, Vec<CompiledEntry>>) -> BatchOutcome {
    let max_depth = chains
        .iter()
        .filter(|(field, _)| state.is_pending(field))
        .map(|(_, chain)| chain.len())
        .max()
        .unwrap_or(0);

    for depth in 0..max_depth {
        if state.pending.is_empty() {
            break;
        }

        let mut needed: Vec<EndpointId> = Vec::new();
        for (field, chain) in chains {
            if !state.is_pending(field) {
                continue;
            }
            if let Some(entry) = chain.get(depth)
                && !needed.contains(&entry.endpoint)
            {
                needed.push(entry.endpoint.clone());
            }
        }
        if needed.is_empty() {
            continue;
        }
        debug!(depth, endpoints = ?needed, pending_count = state.pending.len(), "evaluating depth");

        if fetcher.fetch_all(&mut state.cache, &mut state.report, &needed, depth).await == BatchOutcome::Cancelled {
            return BatchOutcome::Cancelled;
        }

        for (field, chain) in chains {
            if !state.is_pending(field) {
                continue;
            }
            let Some(entry) = chain.get(depth) else {
                continue;
            };
            let Some(raw) = state.cache.ready(&entry.endpoint) else {
                continue;
            };
            state.try_resolve(field, entry, &raw, depth);
        }
        state.report.depth_reached = depth + 1;
    }
    BatchOutcome::Completed
}
