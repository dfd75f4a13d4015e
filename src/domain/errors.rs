//! Error taxonomy of the fetch engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::record::RecordId;

/// Why a single detail fetch failed.
///
/// Every variant is treated as transient by the retry loop. An expired
/// session looks like any other failure here and is recovered by the next
/// keep-alive plus retry round.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchError {
    #[error("HTTP error {0}")]
    HttpStatus(u16),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Response payload was empty")]
    EmptyPayload,
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if let Some(status) = err.status() {
            Self::HttpStatus(status.as_u16())
        } else if err.is_decode() {
            Self::MalformedEnvelope(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Run-level failures. Contract violations are reported before any remote
/// call is made.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Duplicate record identifier in input list: {0}")]
    DuplicateIdentifier(RecordId),

    #[error(transparent)]
    Persistence(#[from] anyhow::Error),
}
