//! Session keep-alive
//!
//! Long runs outlive the portal's idle session timeout, so the engine pings
//! the keep-alive endpoint at the start of every chunk, before every retry
//! round and every few hundred fetches. A failed ping is only logged: an
//! expired session shows up downstream as ordinary fetch failures.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{info, warn};
use url::Url;

use crate::domain::{Credential, FetchError};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::http_client::CoretaxClient;

/// Result of one keep-alive ping. Never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum KeepAliveOutcome {
    Refreshed,
    Rejected(u16),
    Unreachable(String),
}

impl KeepAliveOutcome {
    pub fn is_refreshed(&self) -> bool {
        matches!(self, Self::Refreshed)
    }
}

#[async_trait]
pub trait SessionKeeper: Send + Sync {
    async fn refresh(&self, credential: &Credential) -> KeepAliveOutcome;
}

/// Keep-alive over the portal's identity provider endpoint.
pub struct HttpSessionKeeper {
    client: CoretaxClient,
    endpoint: Url,
    timeout: Duration,
    delay: Duration,
}

impl HttpSessionKeeper {
    pub fn new(client: CoretaxClient, endpoint: Url, timeout: Duration, delay: Duration) -> Self {
        Self {
            client,
            endpoint,
            timeout,
            delay,
        }
    }

    pub fn from_config(client: CoretaxClient, config: &AppConfig) -> Result<Self> {
        let base = Url::parse(&config.portal.base_url)
            .with_context(|| format!("Invalid portal base URL: {}", config.portal.base_url))?;
        let endpoint = base
            .join(&config.portal.keepalive_path)
            .with_context(|| format!("Invalid keep-alive path: {}", config.portal.keepalive_path))?;

        Ok(Self::new(
            client,
            endpoint,
            Duration::from_secs(config.http.keepalive_timeout_seconds),
            Duration::from_millis(config.http.keepalive_delay_ms),
        ))
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl SessionKeeper for HttpSessionKeeper {
    async fn refresh(&self, credential: &Credential) -> KeepAliveOutcome {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        match self
            .client
            .post_json::<serde_json::Value>(&self.endpoint, credential, None, Some(self.timeout))
            .await
        {
            Ok(_) => {
                info!("Session refreshed (keep-alive successful)");
                KeepAliveOutcome::Refreshed
            }
            Err(FetchError::HttpStatus(status)) => {
                warn!(status, "Keep-alive rejected by portal");
                KeepAliveOutcome::Rejected(status)
            }
            Err(e) => {
                warn!(error = %e, "Keep-alive request failed");
                KeepAliveOutcome::Unreachable(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::http_client::CoretaxClientConfig;

    #[test]
    fn endpoint_built_from_portal_config() {
        let client = CoretaxClient::new(CoretaxClientConfig::default()).unwrap();
        let keeper = HttpSessionKeeper::from_config(client, &AppConfig::default()).unwrap();
        assert_eq!(
            keeper.endpoint().as_str(),
            "https://coretaxdjp.pajak.go.id/identityproviderportal/api/Account/SessionKeepAlive"
        );
    }

    #[tokio::test]
    async fn unreachable_portal_does_not_fail() {
        let client = CoretaxClient::new(CoretaxClientConfig {
            connect_timeout: Duration::from_millis(200),
            ..CoretaxClientConfig::default()
        })
        .unwrap();
        let keeper = HttpSessionKeeper::new(
            client,
            Url::parse("http://127.0.0.1:9/keepalive").unwrap(),
            Duration::from_millis(500),
            Duration::ZERO,
        );

        let outcome = keeper.refresh(&Credential::bearer("t")).await;
        assert!(!outcome.is_refreshed());
    }
}
