use tracing::debug;

use super::{
    CallState,
    cache::{BatchFetcher, BatchOutcome},
};
use crate::plan::GlobalStep;

/// Consults endpoints in chain order until nothing is pending.
///
/// Each endpoint is fetched at most once, and only when its field map covers a pending field.
pub(super) async fn run(fetcher: &BatchFetcher<'_>, state: &mut CallState<'_>, steps: &[GlobalStep]) -> BatchOutcome {
    for (index, step) in steps.iter().enumerate() {
        if state.pending.is_empty() {
            break;
        }
        if !step.fields.keys().any(|field| state.is_pending(field)) {
            debug!(endpoint = %step.endpoint, "endpoint covers no pending field, not fetched");
            continue;
        }

        let endpoints = [step.endpoint.clone()];
        if fetcher.fetch_all(&mut state.cache, &mut state.report, &endpoints, index).await == BatchOutcome::Cancelled {
            return BatchOutcome::Cancelled;
        }
        state.report.depth_reached = index + 1;

        let Some(raw) = state.cache.ready(&step.endpoint) else {
            continue;
        };
        for (field, entry) in &step.fields {
            if state.is_pending(field) {
                state.try_resolve(field, entry, &raw, index);
            }
        }
    }
    BatchOutcome::Completed
}
