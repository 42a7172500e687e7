//! Common test utilities

use std::sync::Arc;
use std::time::Duration;

use vidrelay::cache::ResponseCache;
use vidrelay::models::{Endpoint, ProtocolKind};
use vidrelay::pool::InstancePool;
use vidrelay::sources::{HttpSettings, SourceContext};
use vidrelay::utils::clock::ManualClock;

/// Shared collaborators plus the clock driving them
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub context: SourceContext,
}

/// Build a context over the given endpoints with a manual clock
pub fn harness(kind: ProtocolKind, addresses: &[String]) -> Harness {
    let clock = Arc::new(ManualClock::default());
    let pool = Arc::new(InstancePool::with_defaults(InstancePool::endpoints_from(
        kind, addresses,
    )));
    let context = SourceContext::new(pool, Arc::new(ResponseCache::with_defaults()))
        .with_clock(clock.clone());
    Harness { clock, context }
}

/// HTTP settings with a short timeout and no practical rate limit
pub fn fast_settings(timeout_ms: u64) -> HttpSettings {
    HttpSettings {
        timeout: Duration::from_millis(timeout_ms),
        requests_per_second: 1000,
        ..HttpSettings::default()
    }
}

pub fn endpoint(address: &str, kind: ProtocolKind) -> Endpoint {
    Endpoint::new(address, kind)
}
