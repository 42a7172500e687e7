//! Endpoint pool with per-endpoint failure cooldown
//!
//! The pool holds the configured base URLs of every HTTP source protocol in
//! their curated priority order. A failing endpoint is put into cooldown and
//! skipped until the cooldown window has elapsed; nothing is ever removed
//! permanently.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::models::{Endpoint, ProtocolKind};

/// Default cooldown applied to a failing endpoint
pub const DEFAULT_COOLDOWN_SECS: i64 = 180;

// ============================================================================
// Endpoint Health
// ============================================================================

/// Transient failure record for one endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointHealth {
    /// When the endpoint last failed
    pub last_failure: DateTime<Utc>,

    /// Failures since the endpoint last answered successfully
    pub failure_count: u32,

    /// Last error message
    pub last_error: Option<String>,
}

impl EndpointHealth {
    fn new(now: DateTime<Utc>, error: Option<String>) -> Self {
        Self {
            last_failure: now,
            failure_count: 1,
            last_error: error,
        }
    }

    /// Whether the endpoint is still excluded at `now`
    pub fn in_cooldown(&self, now: DateTime<Utc>, cooldown: Duration) -> bool {
        now - self.last_failure < cooldown
    }

    /// Seconds until the endpoint becomes eligible again
    pub fn remaining(&self, now: DateTime<Utc>, cooldown: Duration) -> i64 {
        self.last_failure
            .checked_add_signed(cooldown)
            .map_or(i64::MAX, |until| (until - now).num_seconds().max(0))
    }
}

/// Snapshot of one endpoint for operators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointStatus {
    pub endpoint: Endpoint,
    pub in_cooldown: bool,
    pub cooldown_remaining_secs: i64,
    pub failure_count: u32,
    pub last_error: Option<String>,
}

// ============================================================================
// Instance Pool
// ============================================================================

/// Ordered endpoint lists per protocol plus the shared health map
pub struct InstancePool {
    /// Endpoints in configuration order, immutable after construction
    endpoints: Vec<Endpoint>,

    /// Failure records, keyed by endpoint
    health: RwLock<HashMap<Endpoint, EndpointHealth>>,

    cooldown: Duration,
}

impl InstancePool {
    /// Create a pool from endpoints in priority order
    pub fn new(endpoints: Vec<Endpoint>, cooldown: Duration) -> Self {
        let mut unique: Vec<Endpoint> = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            if !endpoint.address.is_empty() && !unique.contains(&endpoint) {
                unique.push(endpoint);
            }
        }

        Self {
            endpoints: unique,
            health: RwLock::new(HashMap::new()),
            cooldown,
        }
    }

    /// Create a pool with the default cooldown window
    pub fn with_defaults(endpoints: Vec<Endpoint>) -> Self {
        Self::new(endpoints, Duration::seconds(DEFAULT_COOLDOWN_SECS))
    }

    /// Build endpoints of one protocol from address strings
    pub fn endpoints_from<I, S>(kind: ProtocolKind, addresses: I) -> Vec<Endpoint>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        addresses
            .into_iter()
            .map(|address| Endpoint::new(address, kind))
            .collect()
    }

    /// Cooldown window
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// All configured endpoints of a protocol, cooldown ignored
    pub fn endpoints(&self, kind: ProtocolKind) -> Vec<Endpoint> {
        self.endpoints
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    /// Whether any endpoint is configured for a protocol
    pub fn has_endpoints(&self, kind: ProtocolKind) -> bool {
        self.endpoints.iter().any(|e| e.kind == kind)
    }

    /// Endpoints of a protocol eligible at `now`, in configuration order
    ///
    /// Records whose cooldown has elapsed are cleared on the way.
    pub async fn next_candidates(&self, kind: ProtocolKind, now: DateTime<Utc>) -> Vec<Endpoint> {
        let mut health = self.health.write().await;
        health.retain(|_, record| record.in_cooldown(now, self.cooldown));

        self.endpoints
            .iter()
            .filter(|e| e.kind == kind && !health.contains_key(*e))
            .cloned()
            .collect()
    }

    /// Record a failure, starting (or restarting) the endpoint's cooldown
    pub async fn mark_failure(&self, endpoint: &Endpoint, now: DateTime<Utc>, error: Option<String>) {
        let mut health = self.health.write().await;
        let record = health
            .entry(endpoint.clone())
            .and_modify(|record| {
                record.last_failure = now;
                record.failure_count += 1;
                record.last_error = error.clone();
            })
            .or_insert_with(|| EndpointHealth::new(now, error.clone()));

        tracing::warn!(
            endpoint = %endpoint.address,
            protocol = %endpoint.kind,
            failures = record.failure_count,
            cooldown_secs = self.cooldown.num_seconds(),
            "Endpoint failed, entering cooldown"
        );
    }

    /// Forget an endpoint's failure record after it answered successfully
    pub async fn mark_success(&self, endpoint: &Endpoint) {
        let mut health = self.health.write().await;
        if health.remove(endpoint).is_some() {
            tracing::debug!(endpoint = %endpoint.address, "Endpoint recovered");
        }
    }

    /// Whether an endpoint is excluded at `now`
    pub async fn in_cooldown(&self, endpoint: &Endpoint, now: DateTime<Utc>) -> bool {
        let health = self.health.read().await;
        health
            .get(endpoint)
            .is_some_and(|record| record.in_cooldown(now, self.cooldown))
    }

    /// Status of every configured endpoint
    pub async fn status(&self, now: DateTime<Utc>) -> Vec<EndpointStatus> {
        let health = self.health.read().await;
        self.endpoints
            .iter()
            .map(|endpoint| match health.get(endpoint) {
                Some(record) => EndpointStatus {
                    endpoint: endpoint.clone(),
                    in_cooldown: record.in_cooldown(now, self.cooldown),
                    cooldown_remaining_secs: record.remaining(now, self.cooldown),
                    failure_count: record.failure_count,
                    last_error: record.last_error.clone(),
                },
                None => EndpointStatus {
                    endpoint: endpoint.clone(),
                    in_cooldown: false,
                    cooldown_remaining_secs: 0,
                    failure_count: 0,
                    last_error: None,
                },
            })
            .collect()
    }
}
