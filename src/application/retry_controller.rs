//! # Retry Controller
//!
//! Resubmits failed identifiers through the worker pool under a fixed retry
//! budget: attempt 0 covers the whole set, then up to `max_retries` rounds
//! cover only what is still failing. Each retry round waits a fixed delay
//! and refreshes the session first.

use std::collections::{BTreeSet, HashMap};
use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{info, warn};

use super::worker_pool::FetchWorkerPool;
use crate::domain::{DetailPayload, FetchContext, RecordId};
use crate::infrastructure::SessionKeeper;

/// What `resolve` hands back once the budget is settled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub successes: HashMap<RecordId, DetailPayload>,
    /// Identifiers still failing after the last allowed round
    pub exhausted: BTreeSet<RecordId>,
    /// Rounds spent in total, including any spent before a resume
    pub attempts: u32,
}

/// State of the retry loop right after a round finished.
#[derive(Debug)]
pub struct RoundOutcome<'a> {
    pub successes: &'a HashMap<RecordId, DetailPayload>,
    pub still_failing: &'a BTreeSet<RecordId>,
    pub attempts_spent: u32,
}

/// Called after every round, before the next one starts.
#[async_trait]
pub trait RoundCheckpoint: Send {
    type Error: Send;

    async fn round_completed(&mut self, round: RoundOutcome<'_>) -> Result<(), Self::Error>;
}

/// Checkpoint that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCheckpoint;

#[async_trait]
impl RoundCheckpoint for NoCheckpoint {
    type Error = Infallible;

    async fn round_completed(&mut self, _round: RoundOutcome<'_>) -> Result<(), Infallible> {
        Ok(())
    }
}

#[derive(Clone)]
pub struct RetryController {
    pool: FetchWorkerPool,
    keeper: Arc<dyn SessionKeeper>,
}

impl RetryController {
    pub fn new(pool: FetchWorkerPool, keeper: Arc<dyn SessionKeeper>) -> Self {
        Self { pool, keeper }
    }

    /// Fetches `ids` with at most `max_retries + 1` attempts per identifier.
    pub async fn resolve(
        &self,
        ids: &[RecordId],
        ctx: &FetchContext,
        max_retries: u32,
    ) -> Resolution {
        match self
            .resolve_from(ids, ctx, max_retries, 0, &mut NoCheckpoint)
            .await
        {
            Ok(resolution) => resolution,
            Err(never) => match never {},
        }
    }

    /// Continues a retry loop that already spent `attempts_spent` rounds on
    /// `ids`. With `attempts_spent == 0` this is a plain `resolve`.
    pub async fn resolve_from<C>(
        &self,
        ids: &[RecordId],
        ctx: &FetchContext,
        max_retries: u32,
        attempts_spent: u32,
        checkpoint: &mut C,
    ) -> Result<Resolution, C::Error>
    where
        C: RoundCheckpoint + ?Sized,
    {
        let mut resolution = Resolution {
            attempts: attempts_spent,
            ..Resolution::default()
        };
        if ids.is_empty() {
            return Ok(resolution);
        }

        let mut failing: Vec<RecordId> = ids.to_vec();
        while !failing.is_empty() && resolution.attempts <= max_retries {
            if resolution.attempts > 0 {
                info!(
                    remaining = failing.len(),
                    round = resolution.attempts,
                    max_retries,
                    "Retrying failed records"
                );
                let delay = ctx.limits.retry_delay;
                if !delay.is_zero() {
                    sleep(delay).await;
                }
                self.keeper.refresh(&ctx.credential).await;
            }

            let outcome = self.pool.fetch_batch(&failing, ctx).await;
            resolution.attempts += 1;

            checkpoint
                .round_completed(RoundOutcome {
                    successes: &outcome.successes,
                    still_failing: &outcome.failures,
                    attempts_spent: resolution.attempts,
                })
                .await?;

            resolution.successes.extend(outcome.successes);
            failing = outcome.failures.into_iter().collect();
        }

        if !failing.is_empty() {
            warn!(
                count = failing.len(),
                attempts = resolution.attempts,
                "Records still failing after retry budget"
            );
        }
        resolution.exhausted = failing.into_iter().collect();
        Ok(resolution)
    }
}
