//! End-to-end queries through the portal against mock instances

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vidrelay::config::Config;
use vidrelay::portal::Portal;

fn config_for(invidious: &MockServer, mirror: &MockServer) -> Config {
    let mut config = Config::default();
    config.sources.invidious = vec![invidious.uri()];
    config.sources.piped = Vec::new();
    config.sources.mirror = vec![mirror.uri()];
    config.sources.request_timeout_secs = 2;
    config.sources.requests_per_second = 1000;
    config.extractor.enabled = false;
    config.batch_worker.enabled = false;
    config.resolver.tiers = vec!["invidious".into(), "mirror".into()];
    config
}

fn item(id: &str) -> serde_json::Value {
    json!({"type": "video", "videoId": id, "title": format!("Video {id}")})
}

#[tokio::test]
async fn test_trending_merges_categories() {
    let invidious = MockServer::start().await;
    let mirror = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/trending"))
        .and(query_param("type", "Music"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([item("b"), item("m1")])))
        .with_priority(1)
        .mount(&invidious)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/trending"))
        .and(query_param("type", "Gaming"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([item("g1"), item("a")])))
        .with_priority(1)
        .mount(&invidious)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/trending"))
        .and(query_param("region", "US"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([item("a"), item("b")])))
        .mount(&invidious)
        .await;

    let mut config = config_for(&invidious, &mirror);
    config.resolver.trending_limit = 3;
    let portal = Portal::new(config).unwrap();

    let trending = portal.trending(Some("US")).await;
    let ids: Vec<_> = trending.iter().map(|v| v.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "m1"]);
}

#[tokio::test]
async fn test_resolve_many_mixes_success_and_failure() {
    let invidious = MockServer::start().await;
    let mirror = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/videos/good"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "videoId": "good",
            "title": "Good",
            "formatStreams": [{"url": "https://cdn/good", "qualityLabel": "360p", "type": "video/mp4"}]
        })))
        .mount(&invidious)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/videos/gone"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"videoId": "gone"})))
        .mount(&invidious)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/gone"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&mirror)
        .await;

    let portal = Portal::new(config_for(&invidious, &mirror)).unwrap();

    let results = portal
        .resolve_many(&["good".to_string(), "gone".to_string()])
        .await;

    assert_eq!(results[0].0, "good");
    assert_eq!(results[0].1.as_ref().unwrap().best_url, "https://cdn/good");
    assert_eq!(results[1].0, "gone");
    assert_eq!(results[1].1.as_ref().unwrap_err().failures().len(), 2);

    // Empty answers are not endpoint failures
    assert!(portal.instances().await.iter().all(|s| !s.in_cooldown));
}

#[tokio::test]
async fn test_search_and_channel() {
    let invidious = MockServer::start().await;
    let mirror = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            item("s1"),
            {"type": "channel", "authorId": "UC1"},
            item("s1"),
            item("s2")
        ])))
        .mount(&invidious)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/channels/UC1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "author": "Channel One",
            "authorId": "UC1",
            "subCount": 1200,
            "authorThumbnails": [{"url": "https://img/uc1.jpg"}]
        })))
        .mount(&invidious)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/channels/UC1/videos"))
        .and(query_param("sort_by", "popular"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"videos": [item("c1")]})))
        .mount(&invidious)
        .await;

    let portal = Portal::new(config_for(&invidious, &mirror)).unwrap();

    let results = portal.search("query", 1).await;
    let ids: Vec<_> = results.iter().map(|v| v.id.as_str()).collect();
    assert_eq!(ids, vec!["s1", "s2"]);

    let channel = portal.channel("UC1").await.unwrap();
    assert_eq!(channel.author, "Channel One");
    assert_eq!(channel.subscriber_count, 1200);
    assert_eq!(channel.thumbnail, "https://img/uc1.jpg");

    let videos = portal.channel_videos("UC1", 1, "popular").await;
    assert_eq!(videos.len(), 1);
    assert_eq!(videos[0].id, "c1");

    let stats = portal.cache_stats().await;
    assert_eq!(stats.entries, 3);
}
