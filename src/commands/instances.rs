use anyhow::Result;
use serde_json::json;

use vidrelay::portal::Portal;

use super::print_json;

/// Endpoint health plus cache counters
pub async fn instances(portal: &Portal) -> Result<()> {
    let endpoints = portal.instances().await;
    let cooling = endpoints.iter().filter(|e| e.in_cooldown).count();
    tracing::debug!(total = endpoints.len(), cooling, "Instance snapshot");

    print_json(&json!({
        "tiers": portal.resolver().tier_names(),
        "endpoints": endpoints,
        "cache": portal.cache_stats().await,
    }))
}
