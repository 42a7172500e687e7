use anyhow::Result;
use serde_json::{json, Value};

use vidrelay::error::VidrelayErrorTrait;
use vidrelay::portal::Portal;

use super::print_json;

/// Resolve every id; fails only when none of them resolved
pub async fn resolve(portal: &Portal, ids: Vec<String>) -> Result<()> {
    let results = portal.resolve_many(&ids).await;
    let resolved = results.iter().filter(|(_, r)| r.is_ok()).count();

    let rendered: Vec<Value> = results
        .into_iter()
        .map(|(id, result)| match result {
            Ok(stream) => json!({ "id": id, "stream": stream }),
            Err(e) => {
                tracing::warn!(
                    id = %id,
                    category = e.category().as_str(),
                    recoverable = e.is_recoverable(),
                    "Resolve failed"
                );
                json!({
                    "id": id,
                    "error": e.to_string(),
                    "retryable": e.is_recoverable(),
                    "failures": e
                        .failures()
                        .iter()
                        .map(|f| json!({
                            "tier": f.tier,
                            "reason": f.reason.to_string(),
                            "category": f.reason.category().as_str(),
                        }))
                        .collect::<Vec<_>>(),
                })
            }
        })
        .collect();

    if rendered.len() == 1 {
        print_json(&rendered[0])?;
    } else {
        print_json(&rendered)?;
    }

    tracing::info!(requested = ids.len(), resolved, "Resolve finished");

    if resolved == 0 {
        anyhow::bail!("stream unavailable for every requested id");
    }
    Ok(())
}
