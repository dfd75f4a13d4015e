//! Run state persistence seam.
//!
//! A store holds at most one [`RunState`] per identity scope. The scheduler
//! decides whether a loaded state still matches the caller's parameters;
//! stores only move bytes.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{RunIdentity, RunState};

#[async_trait]
pub trait RunStateStore: Send + Sync {
    /// The state saved for `identity.scope`, if any.
    async fn load(&self, identity: &RunIdentity) -> Result<Option<RunState>>;

    /// Replaces whatever is stored for `identity.scope`.
    async fn save(&self, identity: &RunIdentity, state: &RunState) -> Result<()>;

    async fn clear(&self, identity: &RunIdentity) -> Result<()>;
}

#[async_trait]
impl<T: RunStateStore + ?Sized> RunStateStore for Arc<T> {
    async fn load(&self, identity: &RunIdentity) -> Result<Option<RunState>> {
        (**self).load(identity).await
    }

    async fn save(&self, identity: &RunIdentity, state: &RunState) -> Result<()> {
        (**self).save(identity, state).await
    }

    async fn clear(&self, identity: &RunIdentity) -> Result<()> {
        (**self).clear(identity).await
    }
}

/// Process-local store, for tests and one-shot runs.
#[derive(Debug, Default)]
pub struct MemoryRunStateStore {
    states: RwLock<HashMap<String, RunState>>,
}

impl MemoryRunStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }
}

#[async_trait]
impl RunStateStore for MemoryRunStateStore {
    async fn load(&self, identity: &RunIdentity) -> Result<Option<RunState>> {
        Ok(self.states.read().await.get(&identity.scope).cloned())
    }

    async fn save(&self, identity: &RunIdentity, state: &RunState) -> Result<()> {
        self.states
            .write()
            .await
            .insert(identity.scope.clone(), state.clone());
        Ok(())
    }

    async fn clear(&self, identity: &RunIdentity) -> Result<()> {
        self.states.write().await.remove(&identity.scope);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RecordId;

    #[tokio::test]
    async fn one_state_per_scope() -> Result<()> {
        let store = MemoryRunStateStore::new();
        let first = RunIdentity::new("output-invoice").with_param("period", "TD.00709");
        let second = RunIdentity::new("output-invoice").with_param("period", "TD.00710");

        store
            .save(&first, &RunState::fresh(first.clone(), &[RecordId::new("a")]))
            .await?;
        store
            .save(&second, &RunState::fresh(second.clone(), &[]))
            .await?;

        assert_eq!(store.len().await, 1);
        let loaded = store.load(&first).await?.expect("state for scope");
        assert_eq!(loaded.identity, second);

        store.clear(&first).await?;
        assert!(store.is_empty().await);
        assert!(store.load(&second).await?.is_none());
        Ok(())
    }
}
