//! Persisted run state and the values the scheduler reports to its caller.
//!
//! A run may span many process lifetimes, so everything needed to pick up
//! where the previous invocation stopped lives in [`RunState`], never in
//! locals or task state.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::collection::{DocumentCollection, TaxPeriod};
use super::record::{DetailPayload, RecordId};

/// Caller-visible parameters that define a run's identifier list.
///
/// `scope` names the slot a run occupies in the store (one active run per
/// scope). `params` are compared as a whole: any change starts a new run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunIdentity {
    pub scope: String,
    pub params: BTreeMap<String, String>,
}

impl RunIdentity {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            params: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(name.into(), value.to_string());
        self
    }

    /// Identity used by the dashboard pages: period code, year and the
    /// number of rows requested from the list call.
    pub fn for_period(collection: DocumentCollection, period: TaxPeriod, rows: u32) -> Self {
        Self::new(collection.as_str())
            .with_param("period", period.code())
            .with_param("year", period.year())
            .with_param("rows", rows)
    }

    /// Stable hash of scope and parameters.
    pub fn key(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.scope.as_bytes());
        for (name, value) in &self.params {
            hasher.update(b"\n");
            hasher.update(name.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }
}

impl fmt::Display for RunIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.scope)?;
        for (name, value) in &self.params {
            write!(f, " {name}={value}")?;
        }
        Ok(())
    }
}

/// Counts suitable for a progress indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Identifiers fully resolved, success or exhausted failure
    pub processed: usize,
    pub total: usize,
    pub succeeded: usize,
    pub exhausted: usize,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let fraction = self.processed as f64 / self.total as f64;
        fraction
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} processed ({} ok, {} failed)",
            self.processed, self.total, self.succeeded, self.exhausted
        )
    }
}

/// Final outcome of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub total: usize,
    pub results: BTreeMap<RecordId, DetailPayload>,
    /// Identifiers that failed through the whole retry budget, for manual follow-up
    pub exhausted_failures: Vec<RecordId>,
}

/// What one `advance` call achieved.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionStatus {
    /// More chunks remain; the caller must invoke `advance` again.
    Suspended(Progress),
    Completed(RunReport),
}

impl CompletionStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// The only mutable, externally persisted entity of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub identity: RunIdentity,
    /// blake3 of the ordered identifier list this state was built from
    pub list_fingerprint: String,
    pub total: usize,
    /// Identifiers of the original list fully resolved so far
    pub cursor: usize,
    pub accumulated_results: BTreeMap<RecordId, DetailPayload>,
    /// Failures of the chunk in flight that still have retry budget
    pub pending_failures: BTreeSet<RecordId>,
    /// Attempts already spent on `pending_failures`
    pub pending_attempts: u32,
    pub exhausted_failures: BTreeSet<RecordId>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunState {
    pub fn fresh(identity: RunIdentity, ids: &[RecordId]) -> Self {
        let now = Utc::now();
        Self {
            identity,
            list_fingerprint: Self::fingerprint(ids),
            total: ids.len(),
            cursor: 0,
            accumulated_results: BTreeMap::new(),
            pending_failures: BTreeSet::new(),
            pending_attempts: 0,
            exhausted_failures: BTreeSet::new(),
            started_at: now,
            updated_at: now,
        }
    }

    pub fn fingerprint(ids: &[RecordId]) -> String {
        let mut hasher = blake3::Hasher::new();
        for id in ids {
            hasher.update(&(id.as_str().len() as u64).to_le_bytes());
            hasher.update(id.as_str().as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }

    /// True when this state was built for exactly this identity and list.
    pub fn belongs_to(&self, identity: &RunIdentity, ids: &[RecordId]) -> bool {
        self.identity == *identity
            && self.total == ids.len()
            && self.list_fingerprint == Self::fingerprint(ids)
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.total && self.pending_failures.is_empty()
    }

    pub fn progress(&self) -> Progress {
        Progress {
            processed: self.cursor,
            total: self.total,
            succeeded: self.accumulated_results.len(),
            exhausted: self.exhausted_failures.len(),
        }
    }

    /// Checkpoint after one fetch round of the chunk in flight.
    pub fn record_round(
        &mut self,
        successes: HashMap<RecordId, DetailPayload>,
        still_failing: BTreeSet<RecordId>,
        attempts_spent: u32,
    ) {
        self.accumulated_results.extend(successes);
        self.pending_failures = still_failing;
        self.pending_attempts = attempts_spent;
        self.updated_at = Utc::now();
    }

    /// Closes the chunk in flight: its leftovers become exhausted failures
    /// and the cursor moves past every identifier of the chunk.
    pub fn finish_chunk(&mut self, chunk_len: usize, exhausted: BTreeSet<RecordId>) {
        self.exhausted_failures.extend(exhausted);
        self.pending_failures.clear();
        self.pending_attempts = 0;
        self.cursor = (self.cursor + chunk_len).min(self.total);
        self.updated_at = Utc::now();
    }

    pub fn report(&self) -> RunReport {
        RunReport {
            total: self.total,
            results: self.accumulated_results.clone(),
            exhausted_failures: self.exhausted_failures.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<RecordId> {
        values.iter().map(|v| RecordId::new(*v)).collect()
    }

    #[test]
    fn identity_key_depends_on_every_param() {
        let period = TaxPeriod::new(9, 2025).unwrap();
        let base = RunIdentity::for_period(DocumentCollection::OutputInvoice, period, 200);
        let other_rows = RunIdentity::for_period(DocumentCollection::OutputInvoice, period, 300);
        let other_month = RunIdentity::for_period(
            DocumentCollection::OutputInvoice,
            TaxPeriod::new(10, 2025).unwrap(),
            200,
        );

        assert_eq!(base.key(), base.clone().key());
        assert_ne!(base.key(), other_rows.key());
        assert_ne!(base.key(), other_month.key());
        assert_eq!(base.params.get("period").map(String::as_str), Some("TD.00709"));
    }

    #[test]
    fn fingerprint_is_order_sensitive() {
        assert_ne!(
            RunState::fingerprint(&ids(&["a", "b"])),
            RunState::fingerprint(&ids(&["b", "a"]))
        );
        assert_ne!(
            RunState::fingerprint(&ids(&["ab", "c"])),
            RunState::fingerprint(&ids(&["a", "bc"]))
        );
    }

    #[test]
    fn chunk_lifecycle_moves_cursor_and_clears_pending() {
        let list = ids(&["a", "b", "c"]);
        let mut state = RunState::fresh(RunIdentity::new("test"), &list);
        assert!(state.belongs_to(&RunIdentity::new("test"), &list));

        let mut ok = HashMap::new();
        ok.insert(RecordId::new("a"), serde_json::json!({"n": 1}));
        state.record_round(ok, BTreeSet::from([RecordId::new("b")]), 1);
        assert_eq!(state.pending_attempts, 1);
        assert!(!state.is_complete());

        state.finish_chunk(2, BTreeSet::from([RecordId::new("b")]));
        assert_eq!(state.cursor, 2);
        assert!(state.pending_failures.is_empty());
        assert_eq!(state.progress().exhausted, 1);

        state.finish_chunk(5, BTreeSet::new());
        assert_eq!(state.cursor, 3);
        assert!(state.is_complete());
    }

    #[test]
    fn empty_progress_reports_done() {
        let state = RunState::fresh(RunIdentity::new("empty"), &[]);
        assert!(state.is_complete());
        assert!((state.progress().fraction() - 1.0).abs() < f64::EPSILON);
    }
}
