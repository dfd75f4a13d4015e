//! # Chunk Scheduler / Result Accumulator
//!
//! Drives a run one chunk at a time. Everything needed to continue lives in
//! the persisted [`RunState`], so the process may be torn down between any
//! two `advance` calls, and between any two retry rounds inside a chunk.
//!
//! Per invocation:
//! 1. Validate the context and reject duplicate identifiers.
//! 2. Load the state for the identity's scope, discarding it when the
//!    parameters or the identifier list changed.
//! 3. For up to `chunks_per_invocation` chunks: ping the session, resolve
//!    the chunk through the retry controller (checkpointing after every
//!    round), close the chunk and save.
//! 4. Report `Suspended` with progress or `Completed` with the results.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::retry_controller::{RetryController, RoundCheckpoint, RoundOutcome};
use super::worker_pool::FetchWorkerPool;
use crate::domain::{CompletionStatus, EngineError, FetchContext, RecordId, RunIdentity, RunState};
use crate::infrastructure::{DetailFetcher, RunStateStore, SessionKeeper};

pub struct ChunkScheduler<S> {
    controller: RetryController,
    keeper: Arc<dyn SessionKeeper>,
    store: S,
}

impl<S: RunStateStore> ChunkScheduler<S> {
    pub fn new(fetcher: Arc<dyn DetailFetcher>, keeper: Arc<dyn SessionKeeper>, store: S) -> Self {
        let pool = FetchWorkerPool::new(fetcher, keeper.clone());
        Self {
            controller: RetryController::new(pool, keeper.clone()),
            keeper,
            store,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Processes the next chunk(s) of `ids` for the run named by `identity`.
    pub async fn advance(
        &self,
        identity: &RunIdentity,
        ids: &[RecordId],
        ctx: &FetchContext,
    ) -> Result<CompletionStatus, EngineError> {
        ctx.validate()?;
        ensure_unique(ids)?;

        let mut state = self.load_or_start(identity, ids).await?;

        let mut chunks_done = 0;
        while !state.is_complete() && chunks_done < ctx.limits.chunks_per_invocation {
            self.process_chunk(identity, ids, ctx, &mut state).await?;
            chunks_done += 1;
        }

        if state.is_complete() {
            let report = state.report();
            info!(
                run = %identity,
                total = report.total,
                succeeded = report.results.len(),
                exhausted = report.exhausted_failures.len(),
                "Run completed"
            );
            Ok(CompletionStatus::Completed(report))
        } else {
            let progress = state.progress();
            info!(run = %identity, %progress, "Run suspended");
            Ok(CompletionStatus::Suspended(progress))
        }
    }

    /// Drops any persisted state for the identity's scope.
    pub async fn reset(&self, identity: &RunIdentity) -> Result<(), EngineError> {
        self.store.clear(identity).await?;
        info!(scope = %identity.scope, "Run state cleared");
        Ok(())
    }

    async fn load_or_start(
        &self,
        identity: &RunIdentity,
        ids: &[RecordId],
    ) -> Result<RunState, EngineError> {
        match self.store.load(identity).await? {
            Some(state) if state.belongs_to(identity, ids) => {
                debug!(run = %identity, cursor = state.cursor, total = state.total, "Resuming run");
                return Ok(state);
            }
            Some(stale) => {
                info!(
                    previous = %stale.identity,
                    current = %identity,
                    "Run parameters changed, starting over"
                );
            }
            None => {
                info!(run = %identity, total = ids.len(), "Starting new run");
            }
        }

        let state = RunState::fresh(identity.clone(), ids);
        self.store.save(identity, &state).await?;
        Ok(state)
    }

    async fn process_chunk(
        &self,
        identity: &RunIdentity,
        ids: &[RecordId],
        ctx: &FetchContext,
        state: &mut RunState,
    ) -> Result<(), EngineError> {
        let start = state.cursor;
        let end = (start + ctx.limits.chunk_size).min(ids.len());
        let chunk = &ids[start..end];

        info!(start, end, total = ids.len(), "Processing chunk");
        self.keeper.refresh(&ctx.credential).await;

        // A non-zero attempt count means a previous invocation stopped
        // between rounds of this chunk.
        let attempts_spent = state.pending_attempts;
        let to_fetch: Vec<RecordId> = if attempts_spent > 0 {
            info!(
                pending = state.pending_failures.len(),
                attempts_spent,
                "Resuming interrupted chunk"
            );
            state.pending_failures.iter().cloned().collect()
        } else {
            chunk
                .iter()
                .filter(|id| {
                    !state.accumulated_results.contains_key(*id)
                        && !state.exhausted_failures.contains(*id)
                })
                .cloned()
                .collect()
        };

        let mut checkpoint = StateCheckpoint {
            store: &self.store,
            identity,
            state: &mut *state,
        };
        let resolution = self
            .controller
            .resolve_from(
                &to_fetch,
                ctx,
                ctx.limits.max_retries,
                attempts_spent,
                &mut checkpoint,
            )
            .await?;

        if !resolution.exhausted.is_empty() {
            warn!(
                count = resolution.exhausted.len(),
                records = ?resolution.exhausted,
                "Giving up on records for this run"
            );
        }

        state.finish_chunk(chunk.len(), resolution.exhausted);
        self.store.save(identity, state).await?;
        debug!(cursor = state.cursor, total = state.total, "Chunk closed");
        Ok(())
    }
}

/// Merges each round into the run state and persists it.
struct StateCheckpoint<'a, S> {
    store: &'a S,
    identity: &'a RunIdentity,
    state: &'a mut RunState,
}

#[async_trait]
impl<'a, S: RunStateStore> RoundCheckpoint for StateCheckpoint<'a, S> {
    type Error = EngineError;

    async fn round_completed(&mut self, round: RoundOutcome<'_>) -> Result<(), EngineError> {
        self.state.record_round(
            round.successes.clone(),
            round.still_failing.clone(),
            round.attempts_spent,
        );
        self.store.save(self.identity, self.state).await?;
        Ok(())
    }
}

/// Rejects the run when an identifier appears twice.
fn ensure_unique(ids: &[RecordId]) -> Result<(), EngineError> {
    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(id) {
            return Err(EngineError::DuplicateIdentifier(id.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FetchLimits;
    use crate::infrastructure::MemoryRunStateStore;
    use crate::test_utils::{CountingKeeper, ScriptedFetcher, record_ids, test_context};
    use std::time::Duration;

    fn limits(chunk_size: usize) -> FetchLimits {
        FetchLimits {
            chunk_size,
            retry_delay: Duration::ZERO,
            ..FetchLimits::default()
        }
    }

    #[test]
    fn duplicates_are_detected() {
        let ids = vec![RecordId::new("a"), RecordId::new("b"), RecordId::new("a")];
        assert!(matches!(
            ensure_unique(&ids),
            Err(EngineError::DuplicateIdentifier(id)) if id.as_str() == "a"
        ));
        assert!(ensure_unique(&record_ids(5)).is_ok());
    }

    #[tokio::test]
    async fn chunk_start_pings_session() {
        let keeper = Arc::new(CountingKeeper::default());
        let scheduler = ChunkScheduler::new(
            Arc::new(ScriptedFetcher::new()),
            keeper.clone(),
            MemoryRunStateStore::new(),
        );
        let identity = RunIdentity::new("unit");
        let ctx = test_context(limits(2));
        let ids = record_ids(3);

        let first = scheduler.advance(&identity, &ids, &ctx).await.unwrap();
        assert!(!first.is_completed());
        let second = scheduler.advance(&identity, &ids, &ctx).await.unwrap();
        assert!(second.is_completed());

        assert_eq!(keeper.calls(), 2);
    }

    #[tokio::test]
    async fn invalid_context_is_rejected_before_loading_state() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let scheduler = ChunkScheduler::new(
            fetcher.clone(),
            Arc::new(CountingKeeper::default()),
            MemoryRunStateStore::new(),
        );

        let result = scheduler
            .advance(&RunIdentity::new("unit"), &record_ids(3), &test_context(limits(0)))
            .await;

        assert!(matches!(result, Err(EngineError::InvalidConfiguration(_))));
        assert!(scheduler.store().is_empty().await);
        assert_eq!(fetcher.total_calls(), 0);
    }
}
