//! Test utilities for coretax-fetch
//!
//! Scripted stand-ins for the portal so the engine can be exercised without
//! a live session: a detail fetcher with programmable failures and
//! concurrency instrumentation, a keep-alive that only counts, and a store
//! that simulates a process dying right after a checkpoint.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::json;
use url::Url;

use crate::domain::{
    Credential, DetailPayload, FetchContext, FetchError, FetchLimits, RecordId, RunIdentity,
    RunState,
};
use crate::infrastructure::{
    DetailFetcher, KeepAliveOutcome, MemoryRunStateStore, RunStateStore, SessionKeeper,
};

/// `rec-0`, `rec-1`, ... `rec-{n-1}`
pub fn record_ids(n: usize) -> Vec<RecordId> {
    (0..n).map(|i| RecordId::new(format!("rec-{i}"))).collect()
}

/// Context pointing at a local endpoint that is never contacted.
pub fn test_context(limits: FetchLimits) -> FetchContext {
    let endpoint = Url::parse("http://localhost/einvoiceportal/api/outputinvoice/view")
        .expect("static test endpoint parses");
    FetchContext::new(endpoint, "VAT_VAT", Credential::bearer("test-token"), "tp-test", limits)
}

/// Payload the scripted fetcher returns for `id`.
pub fn scripted_payload(id: &RecordId) -> DetailPayload {
    json!({ "RecordIdentifier": id.as_str(), "Status": "APPROVED" })
}

/// Detail fetcher whose failures are scripted per identifier.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    fail_first: HashMap<RecordId, u32>,
    always_fail: HashSet<RecordId>,
    latency: Duration,
    calls: Mutex<HashMap<RecordId, u32>>,
    total_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// `id` fails on its first `times` attempts, then succeeds.
    #[must_use]
    pub fn fail_times(mut self, id: impl Into<RecordId>, times: u32) -> Self {
        self.fail_first.insert(id.into(), times);
        self
    }

    #[must_use]
    pub fn always_fail<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<RecordId>,
    {
        self.always_fail.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Time each call spends "in flight".
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls_for(&self, id: &str) -> u32 {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&RecordId::new(id))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DetailFetcher for ScriptedFetcher {
    async fn fetch_detail(
        &self,
        record_id: &RecordId,
        _ctx: &FetchContext,
    ) -> Result<DetailPayload, FetchError> {
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        self.total_calls.fetch_add(1, Ordering::SeqCst);

        let attempt = {
            let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
            let count = calls.entry(record_id.clone()).or_insert(0);
            *count += 1;
            *count
        };

        if self.latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted_failures = self.fail_first.get(record_id).copied().unwrap_or(0);
        if self.always_fail.contains(record_id) || attempt <= scripted_failures {
            return Err(FetchError::HttpStatus(503));
        }
        Ok(scripted_payload(record_id))
    }
}

/// Session keeper that counts pings.
#[derive(Debug, Default)]
pub struct CountingKeeper {
    calls: AtomicUsize,
    reject_with: Option<u16>,
}

impl CountingKeeper {
    /// Keeper whose every ping is refused with `status`.
    pub fn rejecting(status: u16) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            reject_with: Some(status),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionKeeper for CountingKeeper {
    async fn refresh(&self, _credential: &Credential) -> KeepAliveOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.reject_with {
            Some(status) => KeepAliveOutcome::Rejected(status),
            None => KeepAliveOutcome::Refreshed,
        }
    }
}

/// Store standing in for a host that dies mid-run: the first
/// `saves_allowed` saves succeed, every later save is written through and
/// then reported as failed, as if the process died right after the write.
#[derive(Debug)]
pub struct CrashingStore {
    inner: Arc<MemoryRunStateStore>,
    saves_left: AtomicUsize,
}

impl CrashingStore {
    pub fn new(inner: Arc<MemoryRunStateStore>, saves_allowed: usize) -> Self {
        Self {
            inner,
            saves_left: AtomicUsize::new(saves_allowed),
        }
    }
}

#[async_trait]
impl RunStateStore for CrashingStore {
    async fn load(&self, identity: &RunIdentity) -> Result<Option<RunState>> {
        self.inner.load(identity).await
    }

    async fn save(&self, identity: &RunIdentity, state: &RunState) -> Result<()> {
        self.inner.save(identity, state).await?;
        let survived = self
            .saves_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if survived {
            Ok(())
        } else {
            Err(anyhow!("simulated crash after saving {}", identity.scope))
        }
    }

    async fn clear(&self, identity: &RunIdentity) -> Result<()> {
        self.inner.clear(identity).await
    }
}
