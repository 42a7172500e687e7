//! In-memory response cache shared by the source adapters
//!
//! Parsed backend payloads are memoized per (protocol, capability, query)
//! for a freshness window. Staleness is checked when an entry is read; there
//! is no background sweep.
//!
//! # Example
//!
//! ```rust,ignore
//! use vidrelay::cache::{CacheKey, ResponseCache};
//!
//! let cache = ResponseCache::with_defaults();
//! let key = CacheKey::new(ProtocolKind::Invidious, "search", &[("q", "cats")]);
//! cache.put(&key, payload, Utc::now()).await;
//! let cached = cache.get(&key, Utc::now()).await;
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use crate::models::ProtocolKind;

/// Default freshness window in seconds
pub const DEFAULT_FRESHNESS_SECS: i64 = 300;

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long an entry stays fresh
    pub freshness: Duration,

    /// Upper bound on stored entries, `None` for unbounded
    pub max_entries: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            freshness: Duration::seconds(DEFAULT_FRESHNESS_SECS),
            max_entries: None,
        }
    }
}

// =========================================================================
// Key Generation
// =========================================================================

/// Hashed key derived from capability name and normalized query parameters
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key; parameter order does not matter and empty values are ignored
    pub fn new(protocol: ProtocolKind, capability: &str, params: &[(&str, &str)]) -> Self {
        let mut normalized: Vec<(String, String)> = params
            .iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(name, value)| (name.to_lowercase(), value.trim().to_string()))
            .collect();
        normalized.sort();

        let mut hasher = Sha256::new();
        hasher.update(protocol.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(capability.as_bytes());
        for (name, value) in &normalized {
            hasher.update([0]);
            hasher.update(name.as_bytes());
            hasher.update([b'=']);
            hasher.update(value.as_bytes());
        }

        Self(format!("{}:{}:{:x}", protocol, capability, hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One memoized payload
#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Value,
    inserted_at: DateTime<Utc>,
}

/// Cache statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Total cache hits
    pub hits: u64,
    /// Total cache misses (absent or stale)
    pub misses: u64,
    /// Entries currently stored, fresh or not
    pub entries: usize,
}

impl CacheStats {
    /// Calculate hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Time-bounded memoization of backend responses
pub struct ResponseCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    /// Create a new cache
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Create with default config
    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    /// Fresh payload for a key, evicting it if stale
    pub async fn get(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<Value> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if now - entry.inserted_at < self.config.freshness => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(key = %key, "Cache hit");
                    return Some(entry.payload.clone());
                }
                Some(_) => {}
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(key = %key, "Cache miss");
                    return None;
                }
            }
        }

        // Stale: re-check under the write lock, a concurrent put may have refreshed it
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(key) {
            if now - entry.inserted_at < self.config.freshness {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.payload.clone());
            }
            entries.remove(key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key = %key, "Cache entry expired");
        None
    }

    /// Store a payload inserted at `now`
    pub async fn put(&self, key: &CacheKey, payload: Value, now: DateTime<Utc>) {
        let mut entries = self.entries.write().await;

        if let Some(max) = self.config.max_entries {
            if !entries.contains_key(key) {
                while entries.len() >= max.max(1) {
                    let oldest = entries
                        .iter()
                        .min_by_key(|(_, entry)| entry.inserted_at)
                        .map(|(k, _)| k.clone());
                    match oldest {
                        Some(oldest) => {
                            entries.remove(&oldest);
                        }
                        None => break,
                    }
                }
            }
        }

        entries.insert(
            key.clone(),
            CacheEntry {
                payload,
                inserted_at: now,
            },
        );
    }

    /// Drop every entry
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of stored entries, fresh or not
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len().await,
        }
    }

    /// Get config reference
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock::{Clock, ManualClock};
    use serde_json::json;

    fn key(query: &str) -> CacheKey {
        CacheKey::new(ProtocolKind::Invidious, "search", &[("q", query), ("page", "1")])
    }

    #[test]
    fn test_key_ignores_param_order_and_empty_values() {
        let a = CacheKey::new(ProtocolKind::Piped, "search", &[("q", "cats"), ("page", "2")]);
        let b = CacheKey::new(
            ProtocolKind::Piped,
            "search",
            &[("page", "2"), ("region", ""), ("q", "cats")],
        );
        assert_eq!(a, b);

        let other_protocol = CacheKey::new(ProtocolKind::Invidious, "search", &[("q", "cats"), ("page", "2")]);
        assert_ne!(a, other_protocol);

        let other_capability = CacheKey::new(ProtocolKind::Piped, "trending", &[("q", "cats"), ("page", "2")]);
        assert_ne!(a, other_capability);
    }

    #[tokio::test]
    async fn test_fresh_within_window_absent_after() {
        let cache = ResponseCache::with_defaults();
        let clock = ManualClock::default();
        let key = key("cats");

        cache.put(&key, json!({"items": []}), clock.now()).await;

        clock.advance(Duration::seconds(299));
        assert_eq!(cache.get(&key, clock.now()).await, Some(json!({"items": []})));

        clock.advance(Duration::seconds(1));
        assert!(cache.get(&key, clock.now()).await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_put_refreshes_insertion_time() {
        let cache = ResponseCache::with_defaults();
        let clock = ManualClock::default();
        let key = key("dogs");

        cache.put(&key, json!(1), clock.now()).await;
        clock.advance(Duration::seconds(200));
        cache.put(&key, json!(2), clock.now()).await;
        clock.advance(Duration::seconds(200));

        assert_eq!(cache.get(&key, clock.now()).await, Some(json!(2)));
    }

    #[tokio::test]
    async fn test_max_entries_evicts_oldest() {
        let cache = ResponseCache::new(CacheConfig {
            max_entries: Some(2),
            ..Default::default()
        });
        let clock = ManualClock::default();

        cache.put(&key("a"), json!("a"), clock.now()).await;
        clock.advance(Duration::seconds(1));
        cache.put(&key("b"), json!("b"), clock.now()).await;
        clock.advance(Duration::seconds(1));
        cache.put(&key("c"), json!("c"), clock.now()).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get(&key("a"), clock.now()).await.is_none());
        assert!(cache.get(&key("c"), clock.now()).await.is_some());
    }

    #[tokio::test]
    async fn test_stats() {
        let cache = ResponseCache::with_defaults();
        let clock = ManualClock::default();
        let key = key("stats");

        assert!(cache.get(&key, clock.now()).await.is_none());
        cache.put(&key, json!(true), clock.now()).await;
        assert!(cache.get(&key, clock.now()).await.is_some());

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }
}
