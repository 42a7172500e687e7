//! Inbound query surface
//!
//! [`Portal`] wires the instance pool, response cache, source adapters and
//! the stream resolver from a [`Config`] and exposes the operations callers
//! use: stream resolution, search, video info, trending, comments and
//! channel lookups.

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;

use crate::cache::{CacheConfig, CacheStats, ResponseCache};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{
    CanonicalVideoInfo, ChannelInfo, CommentPage, ProtocolKind, StreamResolutionResult,
};
use crate::pool::{EndpointStatus, InstancePool};
use crate::reconcile::FormatReconciler;
use crate::resolver::StreamResolver;
use crate::sources::{
    BatchSession, BatchWorkerSource, CommandWorker, InvidiousSource, LocalExtractorSource, MirrorSource,
    PipedSource, SourceAdapter, SourceContext, WorkerDialect,
};
use crate::utils::clock::{Clock, SystemClock};
use crate::utils::error::ResolveError;
use crate::utils::is_valid_content_id;

/// Entry point for all queries
pub struct Portal {
    config: Config,
    context: SourceContext,
    invidious: Arc<InvidiousSource>,
    batch: Option<Arc<BatchWorkerSource>>,
    /// Metadata sources in the order they are asked
    catalog: Vec<Arc<dyn SourceAdapter>>,
    resolver: StreamResolver,
}

impl Portal {
    /// Build every component from configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an invalid configuration and
    /// `Error::Source` if an HTTP client cannot be created
    pub fn new(config: Config) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build with an explicit clock (simulations and tests)
    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::config(format!("{e:#}")))?;

        let pool = Arc::new(InstancePool::new(config.endpoints(), config.cooldown()));
        let cache = Arc::new(ResponseCache::new(CacheConfig {
            freshness: config.cache_freshness(),
            max_entries: config.sources.cache_max_entries,
        }));
        let context = SourceContext::new(pool, cache).with_clock(clock);

        let settings = config.http_settings();
        let reconciler = FormatReconciler::new(config.audio_policy());
        let quality = config.resolver.preferred_quality.clone();

        let invidious = Arc::new(InvidiousSource::new(
            &settings,
            context.clone(),
            reconciler.clone(),
        )?);
        let piped = Arc::new(PipedSource::new(&settings, context.clone(), reconciler.clone())?);
        let mirror = Arc::new(MirrorSource::new(
            &settings,
            context.clone(),
            reconciler.clone(),
            config.sources.mirror_token.clone(),
        )?);

        let extractor = config.extractor.enabled.then(|| {
            let worker = CommandWorker::new(
                config.extractor.program.clone(),
                WorkerDialect::YtDlp,
                config.extractor.timeout(),
            )
            .with_base_args(config.extractor.args.clone())
            .with_watch_url(config.extractor.watch_url.clone());
            Arc::new(LocalExtractorSource::new(
                Arc::new(worker),
                reconciler.clone(),
                quality.clone(),
            ))
        });

        let batch = config.batch_worker.enabled.then(|| {
            let worker = CommandWorker::new(
                config.batch_worker.program.clone(),
                WorkerDialect::Batch,
                config.batch_worker.timeout(),
            )
            .with_base_args(config.batch_worker.args.clone());
            Arc::new(BatchWorkerSource::new(
                Arc::new(worker),
                reconciler.clone(),
                quality.clone(),
            ))
        });

        let mut resolver = StreamResolver::new(config.step_timeout());
        for kind in config.tier_order() {
            let tier: Option<Arc<dyn SourceAdapter>> = match kind {
                ProtocolKind::Invidious => Some(invidious.clone() as Arc<dyn SourceAdapter>),
                ProtocolKind::Piped => Some(piped.clone() as Arc<dyn SourceAdapter>),
                ProtocolKind::Mirror => Some(mirror.clone() as Arc<dyn SourceAdapter>),
                ProtocolKind::LocalExtractor => {
                    extractor.clone().map(|s| s as Arc<dyn SourceAdapter>)
                }
                ProtocolKind::BatchWorker => batch.clone().map(|s| s as Arc<dyn SourceAdapter>),
            };
            match tier {
                Some(tier) => resolver = resolver.with_tier(tier),
                None => tracing::debug!(tier = %kind, "Tier disabled, skipping"),
            }
        }

        let mut catalog: Vec<Arc<dyn SourceAdapter>> = Vec::new();
        catalog.push(invidious.clone());
        catalog.push(piped);
        if let Some(extractor) = extractor {
            catalog.push(extractor);
        }
        if let Some(batch) = batch.clone() {
            catalog.push(batch);
        }

        tracing::info!(tiers = ?resolver.tier_names(), "Portal ready");

        Ok(Self {
            config,
            context,
            invidious,
            batch,
            catalog,
            resolver,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn resolver(&self) -> &StreamResolver {
        &self.resolver
    }

    /// Resolve one content id through the tier chain
    pub async fn resolve_stream(
        &self,
        content_id: &str,
    ) -> std::result::Result<StreamResolutionResult, ResolveError> {
        self.resolver.resolve(content_id).await
    }

    /// Resolve several ids concurrently, results in input order
    ///
    /// Each id walks the chain on its own; when the batch helper is one of
    /// the tiers, it answers every id reaching it with a single call.
    pub async fn resolve_many(
        &self,
        content_ids: &[String],
    ) -> Vec<(String, std::result::Result<StreamResolutionResult, ResolveError>)> {
        let session = self.batch_session(content_ids);
        let resolver = session.as_ref().unwrap_or(&self.resolver);

        let results = join_all(content_ids.iter().map(|id| resolver.resolve(id))).await;
        content_ids.iter().cloned().zip(results).collect()
    }

    /// Chain whose batch tier is shared by `content_ids`
    fn batch_session(&self, content_ids: &[String]) -> Option<StreamResolver> {
        let batch = self.batch.as_ref()?;
        if !self.resolver.has_tier(ProtocolKind::BatchWorker) {
            return None;
        }

        let mut ids: Vec<String> = Vec::new();
        for id in content_ids.iter().map(|id| id.trim()) {
            if is_valid_content_id(id) && !ids.iter().any(|seen| seen == id) {
                ids.push(id.to_string());
            }
        }
        if ids.len() < 2 {
            return None;
        }

        let session = Arc::new(BatchSession::new(batch.clone(), ids));
        Some(self.resolver.with_substitute(ProtocolKind::BatchWorker, session))
    }

    /// First non-empty search result, without duplicate ids
    pub async fn search(&self, query: &str, page: u32) -> Vec<CanonicalVideoInfo> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        for source in &self.catalog {
            let results = dedupe(source.search(query, page).await);
            if !results.is_empty() {
                tracing::debug!(source = source.name(), count = results.len(), "Search answered");
                return results;
            }
        }
        Vec::new()
    }

    /// Metadata for one video from the first source that knows it
    pub async fn video_info(&self, content_id: &str) -> Option<CanonicalVideoInfo> {
        let content_id = content_id.trim();
        for source in &self.catalog {
            if let Some(info) = source.video_info(content_id).await {
                return Some(info);
            }
        }
        None
    }

    /// Trending list merged across the configured categories
    pub async fn trending(&self, region: Option<&str>) -> Vec<CanonicalVideoInfo> {
        let region = region.unwrap_or(&self.config.resolver.default_region);
        let limit = self.config.resolver.trending_limit;

        let mut lists = vec![self.invidious.trending(region).await];
        for category in &self.config.resolver.trending_categories {
            lists.push(self.invidious.trending_category(region, category).await);
        }

        let mut merged = dedupe(lists.into_iter().flatten().collect());
        if merged.is_empty() {
            for source in self.catalog.iter().skip(1) {
                merged = dedupe(source.trending(region).await);
                if !merged.is_empty() {
                    break;
                }
            }
        }

        merged.truncate(limit);
        merged
    }

    /// One page of comments from the first source that has any
    pub async fn comments(&self, content_id: &str, continuation: Option<&str>) -> CommentPage {
        let content_id = content_id.trim();
        for source in &self.catalog {
            let page = source.comments(content_id, continuation).await;
            if !page.comments.is_empty() || page.continuation.is_some() {
                return page;
            }
        }
        CommentPage::default()
    }

    pub async fn channel(&self, channel_id: &str) -> Option<ChannelInfo> {
        self.invidious.channel(channel_id.trim()).await
    }

    pub async fn channel_videos(
        &self,
        channel_id: &str,
        page: u32,
        sort: &str,
    ) -> Vec<CanonicalVideoInfo> {
        self.invidious.channel_videos(channel_id.trim(), page, sort).await
    }

    /// Health snapshot of every configured endpoint
    pub async fn instances(&self) -> Vec<EndpointStatus> {
        self.context.pool.status(self.context.clock.now()).await
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.context.cache.stats().await
    }
}

/// Drop later records whose id was already seen
fn dedupe(items: Vec<CanonicalVideoInfo>) -> Vec<CanonicalVideoInfo> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_config() -> Config {
        let mut config = Config::default();
        config.sources.invidious.clear();
        config.sources.piped.clear();
        config.sources.mirror.clear();
        config.extractor.enabled = false;
        config.batch_worker.enabled = false;
        config
    }

    #[test]
    fn test_disabled_workers_leave_chain() {
        let portal = Portal::new(offline_config()).unwrap();
        assert_eq!(portal.resolver().tier_names(), vec!["invidious", "mirror"]);
    }

    #[test]
    fn test_batch_session_only_for_several_ids() {
        let mut config = offline_config();
        config.batch_worker.enabled = true;
        let portal = Portal::new(config).unwrap();

        let ids = |list: &[&str]| list.iter().map(|s| (*s).to_string()).collect::<Vec<_>>();

        let session = portal.batch_session(&ids(&["a", "b"])).unwrap();
        assert_eq!(session.tier_names(), portal.resolver().tier_names());
        assert!(portal.batch_session(&ids(&["a"])).is_none());
        assert!(portal.batch_session(&ids(&["a", " a ", "../x"])).is_none());

        let mut config = offline_config();
        config.batch_worker.enabled = true;
        config.resolver.tiers = vec!["invidious".into()];
        let portal = Portal::new(config).unwrap();
        assert!(portal.batch_session(&ids(&["a", "b"])).is_none());

        let portal = Portal::new(offline_config()).unwrap();
        assert!(portal.batch_session(&ids(&["a", "b"])).is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = offline_config();
        config.resolver.tiers.clear();
        assert!(matches!(Portal::new(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_out_of_range_cooldown_rejected() {
        let mut config = offline_config();
        config.sources.cooldown_secs = u64::MAX;
        assert!(matches!(Portal::new(config), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_no_endpoints_everything_empty() {
        let portal = Portal::new(offline_config()).unwrap();

        assert!(portal.search("cats", 1).await.is_empty());
        assert!(portal.video_info("abc").await.is_none());
        assert!(portal.trending(None).await.is_empty());
        assert!(portal.comments("abc", None).await.comments.is_empty());
        assert!(portal.instances().await.is_empty());

        let err = portal.resolve_stream("abc").await.unwrap_err();
        assert_eq!(err.failures().len(), 2);
    }

    #[tokio::test]
    async fn test_blank_query_skips_sources() {
        let portal = Portal::new(offline_config()).unwrap();
        assert!(portal.search("   ", 1).await.is_empty());
    }

    #[test]
    fn test_dedupe_keeps_first() {
        let item = |id: &str, title: &str| CanonicalVideoInfo {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        };
        let deduped = dedupe(vec![item("a", "first"), item("b", "b"), item("a", "second")]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].title, "first");
    }
}
