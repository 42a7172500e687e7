//! Stream resolution chain
//!
//! A [`StreamResolver`] walks its tiers strictly in order and stops at the
//! first tier that produces at least one playable format. Each tier runs
//! under a step timeout; a timed out, failing or empty tier is recorded and
//! the next tier is tried. Only when every tier failed does the caller see
//! an error ([`ResolveError::ChainExhausted`]).

use std::sync::Arc;
use std::time::Duration;

use crate::error::VidrelayErrorTrait;
use crate::models::{ProtocolKind, StreamResolutionResult};
use crate::sources::SourceAdapter;
use crate::utils::error::{ResolveError, TierFailure, TierFailureReason};

/// Default per-tier timeout
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(15);

/// Position in the chain
#[derive(Debug)]
enum ChainState {
    /// About to try the tier at this index
    Trying(usize),
    Done(StreamResolutionResult),
    Failed,
}

/// Ordered fallback chain over source adapters
pub struct StreamResolver {
    tiers: Vec<Arc<dyn SourceAdapter>>,
    step_timeout: Duration,
}

impl StreamResolver {
    pub fn new(step_timeout: Duration) -> Self {
        Self {
            tiers: Vec::new(),
            step_timeout,
        }
    }

    /// Append a tier at the end of the chain
    pub fn with_tier(mut self, tier: Arc<dyn SourceAdapter>) -> Self {
        self.tiers.push(tier);
        self
    }

    /// Copy of the chain with every tier of `protocol` replaced by `tier`
    pub fn with_substitute(&self, protocol: ProtocolKind, tier: Arc<dyn SourceAdapter>) -> Self {
        Self {
            tiers: self
                .tiers
                .iter()
                .map(|t| {
                    if t.protocol() == protocol {
                        tier.clone()
                    } else {
                        t.clone()
                    }
                })
                .collect(),
            step_timeout: self.step_timeout,
        }
    }

    /// Whether any tier speaks `protocol`
    pub fn has_tier(&self, protocol: ProtocolKind) -> bool {
        self.tiers.iter().any(|t| t.protocol() == protocol)
    }

    /// Tier names in chain order
    pub fn tier_names(&self) -> Vec<String> {
        self.tiers.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn step_timeout(&self) -> Duration {
        self.step_timeout
    }

    /// Resolve a content id through the chain
    ///
    /// # Errors
    ///
    /// - `ResolveError::InvalidContentId` for ids no source can address
    /// - `ResolveError::ChainExhausted` when no tier produced formats
    pub async fn resolve(&self, content_id: &str) -> Result<StreamResolutionResult, ResolveError> {
        let content_id = content_id.trim();
        if !is_valid_content_id(content_id) {
            return Err(ResolveError::InvalidContentId(content_id.to_string()));
        }

        let mut failures = Vec::new();
        let mut state = ChainState::Trying(0);

        loop {
            state = match state {
                ChainState::Trying(index) => match self.tiers.get(index) {
                    None => ChainState::Failed,
                    Some(tier) => match self.try_tier(tier.as_ref(), content_id).await {
                        Ok(result) => {
                            tracing::info!(
                                content_id,
                                tier = tier.name(),
                                formats = result.formats.len(),
                                "Stream resolved"
                            );
                            ChainState::Done(result)
                        }
                        Err(reason) => {
                            tracing::debug!(
                                content_id,
                                tier = tier.name(),
                                reason = %reason,
                                category = reason.category().as_str(),
                                recoverable = reason.is_recoverable(),
                                "Tier failed, trying next"
                            );
                            failures.push(TierFailure {
                                tier: tier.name().to_string(),
                                reason,
                            });
                            ChainState::Trying(index + 1)
                        }
                    },
                },
                ChainState::Done(result) => return Ok(result),
                ChainState::Failed => {
                    tracing::warn!(
                        content_id,
                        tiers = failures.len(),
                        "Stream unavailable from every tier"
                    );
                    return Err(ResolveError::ChainExhausted {
                        content_id: content_id.to_string(),
                        failures,
                    });
                }
            };
        }
    }

    async fn try_tier(
        &self,
        tier: &dyn SourceAdapter,
        content_id: &str,
    ) -> Result<StreamResolutionResult, TierFailureReason> {
        match tokio::time::timeout(self.step_timeout, tier.resolve_stream(content_id)).await {
            Err(_) => Err(TierFailureReason::TimedOut),
            Ok(Err(e)) => Err(TierFailureReason::Source(e)),
            Ok(Ok(result)) if result.formats.is_empty() => Err(TierFailureReason::EmptyFormats),
            Ok(Ok(result)) => Ok(result),
        }
    }
}

pub use crate::utils::is_valid_content_id;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::models::{RawFormat, StreamKind, StreamMetadata};
    use crate::reconcile::FormatReconciler;
    use crate::utils::error::SourceError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behavior {
        Fail,
        Hang,
        Muxed(&'static str),
    }

    struct StubTier {
        name: &'static str,
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl StubTier {
        fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                name,
                behavior,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SourceAdapter for StubTier {
        fn name(&self) -> &str {
            self.name
        }

        fn protocol(&self) -> ProtocolKind {
            ProtocolKind::Mirror
        }

        async fn resolve_stream(&self, id: &str) -> Result<StreamResolutionResult, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Fail => Err(SourceError::Exhausted {
                    protocol: ProtocolKind::Mirror,
                    attempts: 2,
                }),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(SourceError::Timeout)
                }
                Behavior::Muxed(url) => {
                    let formats = FormatReconciler::default()
                        .reconcile(&[RawFormat::new(url, "360p", StreamKind::Muxed)]);
                    StreamResolutionResult::from_formats(
                        id,
                        StreamMetadata::default(),
                        formats,
                        ProtocolKind::Mirror,
                    )
                    .ok_or(SourceError::NoFormats)
                }
            }
        }
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let first = StubTier::new("first", Behavior::Muxed("https://cdn/first"));
        let second = StubTier::new("second", Behavior::Muxed("https://cdn/second"));
        let resolver = StreamResolver::new(DEFAULT_STEP_TIMEOUT)
            .with_tier(first.clone())
            .with_tier(second.clone());

        let result = resolver.resolve("abc").await.unwrap();

        assert_eq!(result.best_url, "https://cdn/first");
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_falls_through_failures() {
        let failing = StubTier::new("failing", Behavior::Fail);
        let working = StubTier::new("working", Behavior::Muxed("https://cdn/ok"));
        let resolver = StreamResolver::new(DEFAULT_STEP_TIMEOUT)
            .with_tier(failing.clone())
            .with_tier(working);

        let result = resolver.resolve("abc").await.unwrap();

        assert_eq!(result.best_url, "https://cdn/ok");
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hung_tier_times_out() {
        let hung = StubTier::new("hung", Behavior::Hang);
        let working = StubTier::new("working", Behavior::Muxed("https://cdn/ok"));
        let resolver = StreamResolver::new(Duration::from_millis(50))
            .with_tier(hung)
            .with_tier(working);

        let result = resolver.resolve("abc").await.unwrap();
        assert_eq!(result.best_url, "https://cdn/ok");
    }

    #[tokio::test]
    async fn test_chain_exhausted_lists_every_tier() {
        let resolver = StreamResolver::new(DEFAULT_STEP_TIMEOUT)
            .with_tier(StubTier::new("a", Behavior::Fail))
            .with_tier(StubTier::new("b", Behavior::Fail));

        let err = resolver.resolve("abc").await.unwrap_err();

        let tiers: Vec<_> = err.failures().iter().map(|f| f.tier.as_str()).collect();
        assert_eq!(tiers, vec!["a", "b"]);
        assert!(matches!(err, ResolveError::ChainExhausted { .. }));
        assert!(err.is_recoverable());
        assert_eq!(err.failures()[0].reason.category(), ErrorCategory::Network);
    }

    #[tokio::test]
    async fn test_substitute_keeps_position() {
        let mirror = StubTier::new("mirror", Behavior::Fail);
        let replacement = StubTier::new("replacement", Behavior::Muxed("https://cdn/sub"));
        let resolver = StreamResolver::new(DEFAULT_STEP_TIMEOUT).with_tier(mirror.clone());

        let substituted = resolver.with_substitute(ProtocolKind::Mirror, replacement.clone());

        assert_eq!(substituted.tier_names(), vec!["replacement"]);
        assert!(substituted.has_tier(ProtocolKind::Mirror));
        assert!(!substituted.has_tier(ProtocolKind::Piped));
        assert_eq!(substituted.resolve("abc").await.unwrap().best_url, "https://cdn/sub");
        assert_eq!(mirror.calls.load(Ordering::SeqCst), 0);
        assert_eq!(resolver.tier_names(), vec!["mirror"]);
    }

    #[tokio::test]
    async fn test_empty_chain_is_exhausted() {
        let resolver = StreamResolver::new(DEFAULT_STEP_TIMEOUT);
        let err = resolver.resolve("abc").await.unwrap_err();
        assert!(err.failures().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_content_id() {
        let resolver = StreamResolver::new(DEFAULT_STEP_TIMEOUT);
        assert!(matches!(
            resolver.resolve("  ").await,
            Err(ResolveError::InvalidContentId(_))
        ));
        assert!(matches!(
            resolver.resolve("../etc").await,
            Err(ResolveError::InvalidContentId(_))
        ));
    }

    #[test]
    fn test_is_valid_content_id() {
        assert!(is_valid_content_id("dQw4w9WgXcQ"));
        assert!(is_valid_content_id("a-b_c"));
        assert!(!is_valid_content_id("a b"));
        assert!(!is_valid_content_id("a/b"));
        assert!(!is_valid_content_id("../channels/UCx"));
        assert!(!is_valid_content_id(""));
        assert!(!is_valid_content_id(&"a".repeat(65)));
    }
}
