//! Immutable per-run fetch configuration.
//!
//! A `FetchContext` is built once per run and passed by reference to every
//! component, so nothing in the engine reads the session token or the tenant
//! from ambient state.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use super::collection::DocumentCollection;
use super::errors::EngineError;
use super::record::Credential;
use crate::infrastructure::config::defaults;

/// Throughput and resilience knobs of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchLimits {
    /// Maximum number of detail requests in flight at once
    pub max_workers: usize,
    /// Retry rounds after the first attempt
    pub max_retries: u32,
    /// Identifiers processed per invocation of the scheduler
    pub chunk_size: usize,
    /// Fixed pause before each retry round
    pub retry_delay: Duration,
    /// Keep-alive ping after this many completed fetches within one batch
    pub keepalive_every: usize,
    /// Chunks processed before the scheduler suspends
    pub chunks_per_invocation: usize,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            max_workers: defaults::MAX_WORKERS,
            max_retries: defaults::MAX_RETRIES,
            chunk_size: defaults::CHUNK_SIZE,
            retry_delay: Duration::from_millis(defaults::RETRY_DELAY_MS),
            keepalive_every: defaults::KEEPALIVE_EVERY,
            chunks_per_invocation: defaults::CHUNKS_PER_INVOCATION,
        }
    }
}

impl FetchLimits {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_workers == 0 {
            return Err(EngineError::InvalidConfiguration(
                "max_workers must be greater than 0".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(EngineError::InvalidConfiguration(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if self.keepalive_every == 0 {
            return Err(EngineError::InvalidConfiguration(
                "keepalive_every must be greater than 0".to_string(),
            ));
        }
        if self.chunks_per_invocation == 0 {
            return Err(EngineError::InvalidConfiguration(
                "chunks_per_invocation must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything a detail request needs besides the record identifier.
#[derive(Debug, Clone)]
pub struct FetchContext {
    pub credential: Credential,
    pub taxpayer_id: String,
    pub endpoint: Url,
    pub status_filter: String,
    pub limits: FetchLimits,
}

impl FetchContext {
    pub fn new(
        endpoint: Url,
        status_filter: impl Into<String>,
        credential: Credential,
        taxpayer_id: impl Into<String>,
        limits: FetchLimits,
    ) -> Self {
        Self {
            credential,
            taxpayer_id: taxpayer_id.into(),
            endpoint,
            status_filter: status_filter.into(),
            limits,
        }
    }

    /// Context targeting one of the portal's document collections.
    pub fn for_collection(
        base_url: &Url,
        collection: DocumentCollection,
        credential: Credential,
        taxpayer_id: impl Into<String>,
        limits: FetchLimits,
    ) -> Result<Self, EngineError> {
        let endpoint = base_url.join(collection.detail_path()).map_err(|e| {
            EngineError::InvalidConfiguration(format!(
                "Cannot build detail endpoint from {base_url}: {e}"
            ))
        })?;

        Ok(Self::new(
            endpoint,
            collection.status_filter(),
            credential,
            taxpayer_id,
            limits,
        ))
    }

    /// Rejects a context that could never succeed, before any remote call.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.credential.is_empty() {
            return Err(EngineError::InvalidConfiguration(
                "bearer credential is empty".to_string(),
            ));
        }
        if self.taxpayer_id.trim().is_empty() {
            return Err(EngineError::InvalidConfiguration(
                "taxpayer id is empty".to_string(),
            ));
        }
        self.limits.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://coretaxdjp.pajak.go.id").unwrap()
    }

    #[test]
    fn collection_context_targets_detail_endpoint() {
        let ctx = FetchContext::for_collection(
            &base(),
            DocumentCollection::OutputInvoice,
            Credential::bearer("t"),
            "tp-1",
            FetchLimits::default(),
        )
        .unwrap();

        assert_eq!(
            ctx.endpoint.as_str(),
            "https://coretaxdjp.pajak.go.id/einvoiceportal/api/outputinvoice/view"
        );
        assert_eq!(ctx.status_filter, "VAT_VAT");
        assert!(ctx.validate().is_ok());
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let limits = FetchLimits {
            chunk_size: 0,
            ..FetchLimits::default()
        };
        assert!(matches!(limits.validate(), Err(EngineError::InvalidConfiguration(_))));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let limits = FetchLimits {
            max_workers: 0,
            ..FetchLimits::default()
        };
        assert!(matches!(limits.validate(), Err(EngineError::InvalidConfiguration(_))));
    }

    #[test]
    fn missing_credential_is_rejected() {
        let ctx = FetchContext::new(
            base(),
            "",
            Credential::bearer("  "),
            "tp-1",
            FetchLimits::default(),
        );
        assert!(matches!(ctx.validate(), Err(EngineError::InvalidConfiguration(_))));
    }
}
