//! Configuration management for vidrelay
//!
//! This module handles loading and validating configuration from TOML files
//! and `VIDRELAY_*` environment variables. The resolver treats the loaded
//! configuration as read-only.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::models::{Endpoint, ProtocolKind};
use crate::pool::DEFAULT_COOLDOWN_SECS;
use crate::reconcile::AudioPolicy;
use crate::sources::http::{HttpSettings, DEFAULT_USER_AGENT};

/// Longest cooldown or cache freshness window accepted (one year)
pub const MAX_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP source endpoints and client settings
    pub sources: SourcesConfig,

    /// Local extraction tool
    pub extractor: ExtractorConfig,

    /// Companion batch helper
    pub batch_worker: BatchWorkerConfig,

    /// Resolution chain and reconciliation
    pub resolver: ResolverConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Endpoint lists (in priority order) and HTTP client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub invidious: Vec<String>,
    pub piped: Vec<String>,
    pub mirror: Vec<String>,

    /// Access token appended to mirror requests
    pub mirror_token: String,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Outgoing requests per second, per protocol
    pub requests_per_second: u32,

    /// User agent string
    pub user_agent: String,

    /// Cooldown applied to a failed endpoint, in seconds
    pub cooldown_secs: u64,

    /// How long a cached response stays fresh, in seconds
    pub cache_freshness_secs: u64,

    /// Upper bound on cached responses, unbounded when absent
    pub cache_max_entries: Option<usize>,
}

/// yt-dlp compatible extraction tool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub enabled: bool,

    /// Executable to spawn
    pub program: String,

    /// Arguments placed before the request arguments
    pub args: Vec<String>,

    /// Per-call timeout in seconds
    pub timeout_secs: u64,

    /// Watch-page prefix the content id is appended to
    pub watch_url: String,
}

/// Batch helper speaking the `stream`/`batch`/`search` command set
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchWorkerConfig {
    pub enabled: bool,
    pub program: String,

    /// Script and flags placed before the command
    pub args: Vec<String>,

    pub timeout_secs: u64,
}

/// Resolution chain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Tier names in the order they are tried
    ///
    /// Defaults to federated first (`invidious`, `local_extractor`,
    /// `batch_worker`, `mirror`); the extractor-first order is
    /// `local_extractor`, `invidious`, `batch_worker`, `mirror`.
    pub tiers: Vec<String>,

    /// Timeout of a single tier, in seconds
    pub step_timeout_secs: u64,

    /// Quality requested from worker tiers
    pub preferred_quality: String,

    /// Quality labels whose muxed audio is kept as is
    pub native_audio_tiers: Vec<String>,

    /// Demote muxed formats outside `native_audio_tiers` to the best audio track
    pub rewrite_muxed_audio: bool,

    /// Region for trending lists
    pub default_region: String,

    /// Extra trending categories merged into the default list
    pub trending_categories: Vec<String>,

    /// Maximum length of the merged trending list
    pub trending_limit: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, text)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Override values with `VIDRELAY_*` environment variables
    ///
    /// Endpoint and tier lists are comma separated.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(list) = env_list("VIDRELAY_INVIDIOUS_INSTANCES") {
            self.sources.invidious = list;
        }
        if let Some(list) = env_list("VIDRELAY_PIPED_INSTANCES") {
            self.sources.piped = list;
        }
        if let Some(list) = env_list("VIDRELAY_MIRROR_INSTANCES") {
            self.sources.mirror = list;
        }
        if let Ok(token) = std::env::var("VIDRELAY_MIRROR_TOKEN") {
            self.sources.mirror_token = token;
        }
        if let Some(secs) = env_parse("VIDRELAY_REQUEST_TIMEOUT")? {
            self.sources.request_timeout_secs = secs;
        }
        if let Some(rate) = env_parse("VIDRELAY_RATE_LIMIT")? {
            self.sources.requests_per_second = rate;
        }
        if let Ok(agent) = std::env::var("VIDRELAY_USER_AGENT") {
            self.sources.user_agent = agent;
        }
        if let Some(secs) = env_parse("VIDRELAY_COOLDOWN")? {
            self.sources.cooldown_secs = secs;
        }
        if let Some(secs) = env_parse("VIDRELAY_CACHE_FRESHNESS")? {
            self.sources.cache_freshness_secs = secs;
        }
        if let Some(max) = env_parse("VIDRELAY_CACHE_MAX_ENTRIES")? {
            self.sources.cache_max_entries = Some(max);
        }

        if let Ok(program) = std::env::var("VIDRELAY_EXTRACTOR_PROGRAM") {
            self.extractor.program = program;
        }
        if let Ok(program) = std::env::var("VIDRELAY_BATCH_PROGRAM") {
            self.batch_worker.program = program;
        }

        if let Some(tiers) = env_list("VIDRELAY_TIERS") {
            self.resolver.tiers = tiers;
        }
        if let Some(secs) = env_parse("VIDRELAY_STEP_TIMEOUT")? {
            self.resolver.step_timeout_secs = secs;
        }
        if let Ok(quality) = std::env::var("VIDRELAY_QUALITY") {
            self.resolver.preferred_quality = quality;
        }
        if let Ok(region) = std::env::var("VIDRELAY_REGION") {
            self.resolver.default_region = region;
        }

        if let Ok(level) = std::env::var("VIDRELAY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("VIDRELAY_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.sources.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }

        if self.sources.requests_per_second == 0 {
            anyhow::bail!("requests_per_second must be greater than 0");
        }

        if self.sources.cooldown_secs == 0 {
            anyhow::bail!("cooldown_secs must be greater than 0");
        }

        if self.sources.cooldown_secs > MAX_WINDOW_SECS {
            anyhow::bail!("cooldown_secs must be at most {MAX_WINDOW_SECS}");
        }

        if self.sources.cache_freshness_secs == 0 {
            anyhow::bail!("cache_freshness_secs must be greater than 0");
        }

        if self.sources.cache_freshness_secs > MAX_WINDOW_SECS {
            anyhow::bail!("cache_freshness_secs must be at most {MAX_WINDOW_SECS}");
        }

        if self.sources.cache_max_entries == Some(0) {
            anyhow::bail!("cache_max_entries must be greater than 0 when set");
        }

        if self.resolver.step_timeout_secs == 0 {
            anyhow::bail!("step_timeout_secs must be greater than 0");
        }

        if self.resolver.tiers.is_empty() {
            anyhow::bail!("at least one resolver tier is required");
        }

        for tier in &self.resolver.tiers {
            if ProtocolKind::parse(tier).is_none() {
                anyhow::bail!("unknown resolver tier: {tier}");
            }
        }

        for (kind, addresses) in [
            (ProtocolKind::Invidious, &self.sources.invidious),
            (ProtocolKind::Piped, &self.sources.piped),
            (ProtocolKind::Mirror, &self.sources.mirror),
        ] {
            for address in addresses {
                let parsed = url::Url::parse(address.trim())
                    .with_context(|| format!("Invalid {kind} endpoint: {address}"))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    anyhow::bail!("{kind} endpoint must use http or https: {address}");
                }
            }
        }

        for (name, enabled, program, timeout_secs) in [
            (
                "extractor",
                self.extractor.enabled,
                &self.extractor.program,
                self.extractor.timeout_secs,
            ),
            (
                "batch_worker",
                self.batch_worker.enabled,
                &self.batch_worker.program,
                self.batch_worker.timeout_secs,
            ),
        ] {
            if enabled && program.trim().is_empty() {
                anyhow::bail!("{name}.program must be set when {name} is enabled");
            }
            if enabled && timeout_secs == 0 {
                anyhow::bail!("{name}.timeout_secs must be greater than 0");
            }
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("logging.format must be text or json");
        }

        Ok(())
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.sources.request_timeout_secs)
    }

    /// Get per-tier timeout as Duration
    #[must_use]
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.resolver.step_timeout_secs)
    }

    #[must_use]
    pub fn cooldown(&self) -> chrono::Duration {
        window(self.sources.cooldown_secs)
    }

    #[must_use]
    pub fn cache_freshness(&self) -> chrono::Duration {
        window(self.sources.cache_freshness_secs)
    }

    /// Every configured HTTP endpoint, grouped by protocol in priority order
    pub fn endpoints(&self) -> Vec<Endpoint> {
        let mut endpoints = Vec::new();
        for (kind, addresses) in [
            (ProtocolKind::Invidious, &self.sources.invidious),
            (ProtocolKind::Piped, &self.sources.piped),
            (ProtocolKind::Mirror, &self.sources.mirror),
        ] {
            endpoints.extend(addresses.iter().map(|a| Endpoint::new(a, kind)));
        }
        endpoints
    }

    /// Resolver tiers in order; unknown names are skipped
    pub fn tier_order(&self) -> Vec<ProtocolKind> {
        let mut order = Vec::new();
        for kind in self.resolver.tiers.iter().filter_map(|t| ProtocolKind::parse(t)) {
            if !order.contains(&kind) {
                order.push(kind);
            }
        }
        order
    }

    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            timeout: self.request_timeout(),
            requests_per_second: self.sources.requests_per_second,
            user_agent: self.sources.user_agent.clone(),
        }
    }

    pub fn audio_policy(&self) -> AudioPolicy {
        AudioPolicy {
            rewrite_muxed: self.resolver.rewrite_muxed_audio,
            native_audio_tiers: self.resolver.native_audio_tiers.clone(),
        }
    }
}

impl ExtractorConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl BatchWorkerConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn env_list(name: &str) -> Option<Vec<String>> {
    let value = std::env::var(name).ok()?;
    Some(
        value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
    )
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) => {
            let parsed = value
                .trim()
                .parse::<T>()
                .with_context(|| format!("Invalid value for {name}: {value}"))?;
            Ok(Some(parsed))
        }
        Err(_) => Ok(None),
    }
}

/// Seconds as a chrono window, clamped to what chrono can represent
fn window(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            invidious: strings(&[
                "https://invidious.nikkosphere.com",
                "https://yewtu.be",
                "https://invidious.private.coffee",
                "https://invidious.lunivers.trade",
                "https://invidious.schenkel.eti.br",
                "https://inv.nadeko.net",
                "https://iv.duti.dev",
                "https://invidious.f5.si",
                "https://invidious.nerdvpn.de",
                "https://invidious.tiekoetter.com",
                "https://iv.ggtyler.dev",
                "https://iv.melmac.space",
                "https://yt.artemislena.eu",
            ]),
            piped: strings(&[
                "https://nyc1.piapi.ggtyler.dev",
                "https://pipedapi.adminforge.de",
                "https://cal1.piapi.ggtyler.dev",
                "https://pol1.piapi.ggtyler.dev",
                "https://piapi.ggtyler.dev",
                "https://pipedapi.drgns.space",
                "https://api.piped.private.coffee",
                "https://pipedapi.ducks.party",
            ]),
            mirror: strings(&["https://watawatawata.glitch.me"]),
            mirror_token: String::from("wakameoishi"),
            request_timeout_secs: 10,
            requests_per_second: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cooldown_secs: DEFAULT_COOLDOWN_SECS.unsigned_abs(),
            cache_freshness_secs: 300,
            cache_max_entries: None,
        }
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: String::from("yt-dlp"),
            args: Vec::new(),
            timeout_secs: 30,
            watch_url: String::from("https://www.youtube.com/watch?v="),
        }
    }
}

impl Default for BatchWorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: String::from("node"),
            args: vec![String::from("turbo_video_service.js")],
            timeout_secs: 30,
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            tiers: strings(&["invidious", "local_extractor", "batch_worker", "mirror"]),
            step_timeout_secs: 15,
            preferred_quality: String::from("720p"),
            native_audio_tiers: strings(&["360p"]),
            rewrite_muxed_audio: true,
            default_region: String::from("JP"),
            trending_categories: strings(&["Music", "Gaming"]),
            trending_limit: 50,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}
