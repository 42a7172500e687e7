//! Shared HTTP fallback loop for federated sources
//!
//! Every HTTP source goes through [`InstanceClient::get_json`]: cache first,
//! then each eligible endpoint of the protocol in priority order until one
//! answers with a success status and a body of the expected shape. Failing
//! endpoints are put into cooldown on the shared [`InstancePool`].

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT},
    Client,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheKey, ResponseCache};
use crate::models::{Endpoint, ProtocolKind};
use crate::pool::InstancePool;
use crate::utils::clock::{Clock, SystemClock};
use crate::utils::error::SourceError;

/// Default User-Agent for outgoing requests
pub const DEFAULT_USER_AGENT: &str = concat!("vidrelay/", env!("CARGO_PKG_VERSION"));

/// Settings for one HTTP source client
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Per-request timeout
    pub timeout: Duration,

    /// Outgoing requests per second across all endpoints of the protocol
    pub requests_per_second: u32,

    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            requests_per_second: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Collaborators shared by every source of one resolver
#[derive(Clone)]
pub struct SourceContext {
    pub pool: Arc<InstancePool>,
    pub cache: Arc<ResponseCache>,
    pub clock: Arc<dyn Clock>,
}

impl SourceContext {
    pub fn new(pool: Arc<InstancePool>, cache: Arc<ResponseCache>) -> Self {
        Self {
            pool,
            cache,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock (simulations and tests)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// HTTP client for all endpoints of one protocol
pub struct InstanceClient {
    protocol: ProtocolKind,

    /// HTTP client with configured timeout and compression
    client: Client,

    /// Rate limiter to control request frequency
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,

    /// Path prefix between the endpoint address and the capability path
    api_prefix: String,

    context: SourceContext,
}

impl InstanceClient {
    /// Create a client for one protocol
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Transport` if the HTTP client cannot be created
    pub fn new(
        protocol: ProtocolKind,
        api_prefix: &str,
        settings: &HttpSettings,
        context: SourceContext,
    ) -> Result<Self, SourceError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Ok(agent) = HeaderValue::from_str(&settings.user_agent) {
            headers.insert(USER_AGENT, agent);
        }

        let client = Client::builder()
            .timeout(settings.timeout)
            .gzip(true)
            .default_headers(headers)
            .build()?;

        let rate = NonZeroU32::new(settings.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self {
            protocol,
            client,
            rate_limiter,
            api_prefix: api_prefix.trim_matches('/').to_string(),
            context,
        })
    }

    pub fn protocol(&self) -> ProtocolKind {
        self.protocol
    }

    pub fn context(&self) -> &SourceContext {
        &self.context
    }

    fn path_for(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if self.api_prefix.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.api_prefix, path)
        }
    }

    /// Fetch and decode a capability payload
    ///
    /// # Errors
    ///
    /// - `SourceError::NoEndpoints` when the protocol has no endpoints at all
    /// - `SourceError::Exhausted` when every eligible endpoint failed
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        capability: &'static str,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, SourceError> {
        if !self.context.pool.has_endpoints(self.protocol) {
            return Err(SourceError::NoEndpoints(self.protocol));
        }

        let path = self.path_for(path);
        let mut key_params = Vec::with_capacity(params.len() + 1);
        key_params.push(("__path", path.as_str()));
        key_params.extend_from_slice(params);
        let key = CacheKey::new(self.protocol, capability, &key_params);

        if let Some(cached) = self.context.cache.get(&key, self.context.clock.now()).await {
            match serde_json::from_value::<T>(cached) {
                Ok(decoded) => return Ok(decoded),
                Err(e) => tracing::debug!(key = %key, error = %e, "Cached payload no longer decodes"),
            }
        }

        let query: Vec<(&str, &str)> = params
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .copied()
            .collect();

        let candidates = self
            .context
            .pool
            .next_candidates(self.protocol, self.context.clock.now())
            .await;

        let mut attempts = 0;
        for endpoint in candidates {
            attempts += 1;
            match self.fetch(&endpoint, &path, &query).await {
                Ok((raw, decoded)) => {
                    self.context.pool.mark_success(&endpoint).await;
                    self.context.cache.put(&key, raw, self.context.clock.now()).await;
                    tracing::debug!(
                        endpoint = %endpoint.address,
                        capability,
                        attempts,
                        "Endpoint answered"
                    );
                    return Ok(decoded);
                }
                Err(e) if e.counts_against_endpoint() => {
                    self.context
                        .pool
                        .mark_failure(&endpoint, self.context.clock.now(), Some(e.to_string()))
                        .await;
                }
                Err(e) => {
                    tracing::debug!(endpoint = %endpoint.address, error = %e, "Endpoint skipped");
                }
            }
        }

        tracing::debug!(protocol = %self.protocol, capability, attempts, "Source exhausted");
        Err(SourceError::Exhausted {
            protocol: self.protocol,
            attempts,
        })
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        endpoint: &Endpoint,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<(Value, T), SourceError> {
        self.rate_limiter.until_ready().await;

        let url = endpoint.url_for(path);
        tracing::debug!(url = %url, "GET");

        let response = self.client.get(&url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        let raw: Value = serde_json::from_slice(&bytes)?;
        let decoded = serde_json::from_value::<T>(raw.clone())?;
        Ok((raw, decoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResponseCache;

    fn client(prefix: &str) -> InstanceClient {
        let pool = Arc::new(InstancePool::with_defaults(Vec::new()));
        let context = SourceContext::new(pool, Arc::new(ResponseCache::with_defaults()));
        InstanceClient::new(ProtocolKind::Invidious, prefix, &HttpSettings::default(), context)
            .unwrap()
    }

    #[test]
    fn test_path_for_with_prefix() {
        let client = client("/api/v1/");
        assert_eq!(client.path_for("/search"), "api/v1/search");
        assert_eq!(client.path_for("videos/abc"), "api/v1/videos/abc");
    }

    #[test]
    fn test_path_for_without_prefix() {
        let client = client("");
        assert_eq!(client.path_for("streams/abc"), "streams/abc");
    }

    #[tokio::test]
    async fn test_empty_pool_is_a_hard_failure() {
        let client = client("api/v1");
        let result: Result<Value, _> = client.get_json("search", "search", &[("q", "x")]).await;
        assert!(matches!(result, Err(SourceError::NoEndpoints(ProtocolKind::Invidious))));
    }
}
