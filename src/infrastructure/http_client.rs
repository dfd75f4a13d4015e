//! HTTP client for the Coretax portal
//!
//! A thin wrapper around `reqwest` that adds bearer authentication, the
//! portal's JSON conventions, split connect/read timeouts and optional
//! request pacing with a `governor` token bucket.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::Serialize;
use url::Url;

use crate::domain::{Credential, FetchError};
use crate::infrastructure::config::HttpConfig;

/// HTTP client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoretaxClientConfig {
    pub connect_timeout: Duration,
    /// Whole-request timeout for detail calls
    pub request_timeout: Duration,
    pub user_agent: String,
    /// 0 disables pacing
    pub max_requests_per_second: u32,
}

impl Default for CoretaxClientConfig {
    fn default() -> Self {
        Self::from(&HttpConfig::default())
    }
}

impl From<&HttpConfig> for CoretaxClientConfig {
    fn from(config: &HttpConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.connect_timeout_seconds),
            request_timeout: Duration::from_secs(config.read_timeout_seconds),
            user_agent: config.user_agent.clone(),
            max_requests_per_second: config.max_requests_per_second,
        }
    }
}

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Authenticated JSON client shared by the detail fetcher and the session keeper.
#[derive(Clone)]
pub struct CoretaxClient {
    client: Client,
    rate_limiter: Option<Arc<DirectRateLimiter>>,
    config: CoretaxClientConfig,
}

impl CoretaxClient {
    pub fn new(config: CoretaxClientConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .gzip(true)
            .build()
            .context("Failed to create HTTP client")?;

        let rate_limiter = NonZeroU32::new(config.max_requests_per_second)
            .map(|rps| Arc::new(RateLimiter::direct(Quota::per_second(rps))));

        Ok(Self {
            client,
            rate_limiter,
            config,
        })
    }

    pub fn config(&self) -> &CoretaxClientConfig {
        &self.config
    }

    pub fn is_paced(&self) -> bool {
        self.rate_limiter.is_some()
    }

    /// POST `body` as JSON with the session's bearer token.
    ///
    /// Non-2xx statuses are returned as [`FetchError::HttpStatus`].
    /// `timeout` overrides the client-wide request timeout for this call.
    pub async fn post_json<B>(
        &self,
        url: &Url,
        credential: &Credential,
        body: Option<&B>,
        timeout: Option<Duration>,
    ) -> Result<Response, FetchError>
    where
        B: Serialize + ?Sized,
    {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        let mut request = self
            .client
            .post(url.clone())
            .header(AUTHORIZATION, credential.authorization_header())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json");

        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::debug!(%url, status = status.as_u16(), "Portal returned error status");
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation_uses_configured_timeouts() {
        let client = CoretaxClient::new(CoretaxClientConfig::default()).unwrap();
        assert_eq!(client.config().connect_timeout, Duration::from_secs(10));
        assert_eq!(client.config().request_timeout, Duration::from_secs(180));
        assert!(!client.is_paced());
    }

    #[test]
    fn pacing_enabled_when_rate_is_set() {
        let config = CoretaxClientConfig {
            max_requests_per_second: 2,
            ..CoretaxClientConfig::default()
        };
        let client = CoretaxClient::new(config).unwrap();
        assert!(client.is_paced());
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_failure() {
        let config = CoretaxClientConfig {
            connect_timeout: Duration::from_millis(200),
            request_timeout: Duration::from_millis(500),
            ..CoretaxClientConfig::default()
        };
        let client = CoretaxClient::new(config).unwrap();
        // Port 9 on localhost is the discard service, closed on any sane test host
        let url = Url::parse("http://127.0.0.1:9/view").unwrap();

        let result = client
            .post_json(&url, &Credential::bearer("t"), Some(&serde_json::json!({})), None)
            .await;

        assert!(matches!(
            result,
            Err(FetchError::Network(_) | FetchError::Timeout(_))
        ));
    }
}
