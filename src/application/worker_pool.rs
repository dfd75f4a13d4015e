//! # Fetch Worker Pool
//!
//! Runs one detail fetch per identifier with at most `max_workers` requests
//! in flight, and sorts the outcomes into successes and failures. The pool
//! is stateless and never retries; the retry policy lives in
//! [`RetryController`](super::retry_controller::RetryController).

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::domain::{DetailPayload, FetchContext, RecordId};
use crate::infrastructure::{DetailFetcher, SessionKeeper};

/// Outcome of one batch: every submitted identifier lands in exactly one side.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub successes: HashMap<RecordId, DetailPayload>,
    pub failures: BTreeSet<RecordId>,
}

impl BatchOutcome {
    pub fn len(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone)]
pub struct FetchWorkerPool {
    fetcher: Arc<dyn DetailFetcher>,
    keeper: Arc<dyn SessionKeeper>,
}

impl FetchWorkerPool {
    pub fn new(fetcher: Arc<dyn DetailFetcher>, keeper: Arc<dyn SessionKeeper>) -> Self {
        Self { fetcher, keeper }
    }

    /// Fetches every identifier once.
    ///
    /// Concurrency is bounded by `ctx.limits.max_workers`. The session is
    /// refreshed after every `ctx.limits.keepalive_every` completed fetches
    /// while work remains. Duplicate identifiers in `ids` collapse into a
    /// single entry of the outcome.
    pub async fn fetch_batch(&self, ids: &[RecordId], ctx: &FetchContext) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        if ids.is_empty() {
            return outcome;
        }

        let max_workers = ctx.limits.max_workers.max(1);
        let keepalive_every = ctx.limits.keepalive_every.max(1);
        let fetcher = &self.fetcher;

        let mut results = stream::iter(ids)
            .map(|id| async move { (id, fetcher.fetch_detail(id, ctx).await) })
            .buffer_unordered(max_workers);

        let mut completed = 0usize;
        while let Some((id, result)) = results.next().await {
            completed += 1;
            match result {
                Ok(payload) => {
                    debug!(record_id = %id, "Detail fetched");
                    outcome.successes.insert(id.clone(), payload);
                }
                Err(e) => {
                    warn!(record_id = %id, error = %e, "Detail fetch failed");
                    outcome.failures.insert(id.clone());
                }
            }

            if completed % keepalive_every == 0 && completed < ids.len() {
                self.keeper.refresh(&ctx.credential).await;
            }
        }

        debug!(
            submitted = ids.len(),
            succeeded = outcome.successes.len(),
            failed = outcome.failures.len(),
            "Batch finished"
        );
        outcome
    }
}
