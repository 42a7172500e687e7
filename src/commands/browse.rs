//! Metadata queries: info, search, trending, comments, channel

use anyhow::Result;
use serde_json::json;

use vidrelay::portal::Portal;

use super::print_json;

pub async fn info(portal: &Portal, id: &str) -> Result<()> {
    match portal.video_info(id).await {
        Some(info) => print_json(&info),
        None => anyhow::bail!("no source knows video {id}"),
    }
}

pub async fn search(portal: &Portal, query: &str, page: u32) -> Result<()> {
    let results = portal.search(query, page).await;
    tracing::debug!(query, page, count = results.len(), "Search finished");
    print_json(&results)
}

pub async fn trending(portal: &Portal, region: Option<&str>) -> Result<()> {
    print_json(&portal.trending(region).await)
}

pub async fn comments(portal: &Portal, id: &str, continuation: Option<&str>) -> Result<()> {
    print_json(&portal.comments(id, continuation).await)
}

pub async fn channel(portal: &Portal, id: &str, page: u32, sort: &str) -> Result<()> {
    let Some(info) = portal.channel(id).await else {
        anyhow::bail!("channel {id} not found");
    };
    let videos = portal.channel_videos(id, page, sort).await;
    print_json(&json!({ "channel": info, "videos": videos }))
}
