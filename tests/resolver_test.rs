//! Resolution chain across real adapters and mock endpoints

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use vidrelay::models::{ProtocolKind, StreamResolutionResult};
use vidrelay::reconcile::FormatReconciler;
use vidrelay::resolver::StreamResolver;
use vidrelay::sources::{MirrorSource, SourceAdapter};
use vidrelay::utils::clock::Clock;
use vidrelay::utils::error::{ResolveError, SourceError, TierFailureReason};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{endpoint, fast_settings, harness};

/// Tier that answers with a result carrying no formats
struct EmptyTier;

#[async_trait]
impl SourceAdapter for EmptyTier {
    fn name(&self) -> &str {
        "empty"
    }

    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Invidious
    }

    async fn resolve_stream(&self, id: &str) -> Result<StreamResolutionResult, SourceError> {
        Ok(StreamResolutionResult {
            content_id: id.to_string(),
            title: String::new(),
            duration_secs: 0,
            thumbnail: String::new(),
            uploader: String::new(),
            best_url: String::new(),
            has_audio: false,
            audio_url: None,
            formats: Vec::new(),
            source: ProtocolKind::Invidious,
        })
    }
}

fn mirror(h: &common::Harness) -> Arc<MirrorSource> {
    Arc::new(
        MirrorSource::new(
            &fast_settings(1000),
            h.context.clone(),
            FormatReconciler::default(),
            "secret",
        )
        .unwrap(),
    )
}

#[tokio::test]
async fn test_empty_tier_falls_through_to_mirror() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/vid1"))
        .and(query_param("token", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "title": "Mirrored",
            "videoUrl": "https://hq/vid1-360",
            "quality": "360p",
            "resolution": "640x360"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(ProtocolKind::Mirror, &[server.uri()]);
    let mirror = mirror(&h);
    let resolver = StreamResolver::new(Duration::from_secs(5))
        .with_tier(Arc::new(EmptyTier))
        .with_tier(mirror.clone());

    let result = resolver.resolve("vid1").await.unwrap();

    assert_eq!(result.source, ProtocolKind::Mirror);
    assert_eq!(result.title, "Mirrored");
    assert_eq!(result.best_url, "https://hq/vid1-360");
    assert!(result.has_audio);
    assert_eq!(result.formats.len(), 1);
    assert_eq!(result.formats[0].quality, "360p");

    // Served from cache, identical to what the chain returned
    let again = mirror.resolve_stream("vid1").await.unwrap();
    assert_eq!(again, result);

    assert!(
        !h.context
            .pool
            .in_cooldown(&endpoint(&server.uri(), ProtocolKind::Mirror), h.clock.now())
            .await
    );
}

#[tokio::test]
async fn test_every_tier_failing_is_chain_exhausted() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let h = harness(ProtocolKind::Mirror, &[server.uri()]);
    let resolver = StreamResolver::new(Duration::from_secs(5))
        .with_tier(Arc::new(EmptyTier))
        .with_tier(mirror(&h));

    let err = resolver.resolve("vid2").await.unwrap_err();

    match &err {
        ResolveError::ChainExhausted { content_id, failures } => {
            assert_eq!(content_id, "vid2");
            assert_eq!(failures.len(), 2);
            assert!(matches!(failures[0].reason, TierFailureReason::EmptyFormats));
            assert!(matches!(
                failures[1].reason,
                TierFailureReason::Source(SourceError::Exhausted { attempts: 1, .. })
            ));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert!(
        h.context
            .pool
            .in_cooldown(&endpoint(&server.uri(), ProtocolKind::Mirror), h.clock.now())
            .await
    );
}

#[tokio::test]
async fn test_slow_mirror_hits_step_timeout() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"videoUrl": "https://hq/late"}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let h = harness(ProtocolKind::Mirror, &[server.uri()]);
    let mirror = Arc::new(
        MirrorSource::new(
            &fast_settings(10_000),
            h.context.clone(),
            FormatReconciler::default(),
            "secret",
        )
        .unwrap(),
    );
    let resolver = StreamResolver::new(Duration::from_millis(200)).with_tier(mirror);

    let err = resolver.resolve("vid3").await.unwrap_err();
    assert!(matches!(err.failures()[0].reason, TierFailureReason::TimedOut));
}
