// Core data structures for vidrelay

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Backend protocol families a source can speak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    /// Federated instances exposing `/api/v1/...`
    Invidious,
    /// Federated instances exposing the Piped API
    Piped,
    /// Last-resort high-quality mirror
    Mirror,
    /// Local extraction tool driven as a worker process
    LocalExtractor,
    /// Companion batch-extraction helper
    BatchWorker,
}

impl ProtocolKind {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invidious => "invidious",
            Self::Piped => "piped",
            Self::Mirror => "mirror",
            Self::LocalExtractor => "local_extractor",
            Self::BatchWorker => "batch_worker",
        }
    }

    /// Create from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "invidious" => Some(Self::Invidious),
            "piped" => Some(Self::Piped),
            "mirror" => Some(Self::Mirror),
            "local_extractor" | "extractor" | "ytdl" => Some(Self::LocalExtractor),
            "batch_worker" | "batch" | "turbo" => Some(Self::BatchWorker),
            _ => None,
        }
    }

    /// Whether the protocol is reached over HTTP endpoint lists
    pub fn is_http(&self) -> bool {
        matches!(self, Self::Invidious | Self::Piped | Self::Mirror)
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One base URL of a source protocol, immutable once loaded
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Base address without trailing slash
    pub address: String,
    pub kind: ProtocolKind,
}

impl Endpoint {
    pub fn new(address: impl AsRef<str>, kind: ProtocolKind) -> Self {
        Self {
            address: address.as_ref().trim().trim_end_matches('/').to_string(),
            kind,
        }
    }

    /// Build a full URL for a path relative to this endpoint
    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.address, path.trim_start_matches('/'))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.address, self.kind)
    }
}

/// Normalized video metadata returned by every adapter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalVideoInfo {
    pub id: String,
    pub title: String,
    pub duration_secs: u64,
    pub author: String,
    pub author_id: String,
    pub thumbnail: String,
    /// Unix timestamp of publication, when reported
    pub published: Option<i64>,
    pub published_text: String,
    pub view_count: u64,
    pub description: String,
    /// Source-specific fields that have no canonical slot
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl CanonicalVideoInfo {
    /// Whether the record can be handed to callers
    pub fn is_valid(&self) -> bool {
        !self.id.trim().is_empty()
    }
}

/// What a raw stream carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Audio and video in one delivery URL
    Muxed,
    VideoOnly,
    AudioOnly,
}

/// A single encoded variant as reported by one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFormat {
    pub url: String,
    /// Quality label, e.g. "720p"
    pub quality: String,
    /// Resolution string, e.g. "1280x720"
    pub resolution: String,
    pub kind: StreamKind,
    /// Companion audio URL supplied by the source itself
    pub audio_url: Option<String>,
    pub bitrate: u64,
    pub fps: u32,
    /// Container extension
    pub ext: String,
}

impl RawFormat {
    pub fn new(url: impl Into<String>, quality: impl Into<String>, kind: StreamKind) -> Self {
        Self {
            url: url.into(),
            quality: quality.into(),
            resolution: String::new(),
            kind,
            audio_url: None,
            bitrate: 0,
            fps: 30,
            ext: "mp4".to_string(),
        }
    }

    pub fn with_resolution(mut self, resolution: impl Into<String>) -> Self {
        self.resolution = resolution.into();
        self
    }

    pub fn with_bitrate(mut self, bitrate: u64) -> Self {
        self.bitrate = bitrate;
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_ext(mut self, ext: impl Into<String>) -> Self {
        self.ext = ext.into();
        self
    }

    pub fn with_audio_url(mut self, audio_url: Option<String>) -> Self {
        self.audio_url = audio_url;
        self
    }

    /// Whether the stream carries audio in its own URL
    pub fn has_native_audio(&self) -> bool {
        matches!(self.kind, StreamKind::Muxed | StreamKind::AudioOnly)
    }

    pub fn is_audio_only(&self) -> bool {
        self.kind == StreamKind::AudioOnly
    }
}

/// A format after reconciliation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledFormat {
    pub url: String,
    pub quality: String,
    pub resolution: String,
    /// True only when the stream itself is muxed
    pub has_audio: bool,
    /// Separately hosted audio track to play alongside a video-only stream
    pub audio_url: Option<String>,
    pub bitrate: u64,
    pub fps: u32,
    pub ext: String,
}

/// Descriptive fields attached to a resolved stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamMetadata {
    pub title: String,
    pub duration_secs: u64,
    pub thumbnail: String,
    pub uploader: String,
}

/// Final payload of a successful resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamResolutionResult {
    pub content_id: String,
    pub title: String,
    pub duration_secs: u64,
    pub thumbnail: String,
    pub uploader: String,
    /// Equals `formats[0].url` whenever `formats` is non-empty
    pub best_url: String,
    pub has_audio: bool,
    pub audio_url: Option<String>,
    pub formats: Vec<ReconciledFormat>,
    /// Which source produced the result
    pub source: ProtocolKind,
}

impl StreamResolutionResult {
    /// Assemble a result from reconciled formats; `None` when there is
    /// nothing to play
    pub fn from_formats(
        content_id: impl Into<String>,
        metadata: StreamMetadata,
        formats: Vec<ReconciledFormat>,
        source: ProtocolKind,
    ) -> Option<Self> {
        let best = formats.first()?.clone();
        Some(Self {
            content_id: content_id.into(),
            title: metadata.title,
            duration_secs: metadata.duration_secs,
            thumbnail: metadata.thumbnail,
            uploader: metadata.uploader,
            best_url: best.url,
            has_audio: best.has_audio,
            audio_url: best.audio_url,
            formats,
            source,
        })
    }

    /// Format matching a quality label, if present
    pub fn format_for(&self, quality: &str) -> Option<&ReconciledFormat> {
        self.formats.iter().find(|f| f.quality == quality)
    }
}

/// One comment as returned by a source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub author: String,
    pub author_id: String,
    pub author_thumbnail: String,
    pub content: String,
    pub published: Option<i64>,
    pub published_text: String,
    pub like_count: u64,
    pub reply_count: u64,
    pub is_owner: bool,
    pub is_pinned: bool,
}

/// A page of comments plus the token for the next page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommentPage {
    pub comments: Vec<CommentRecord>,
    pub continuation: Option<String>,
    pub comment_count: Option<u64>,
}

/// Channel summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub author: String,
    pub author_id: String,
    pub description: String,
    pub subscriber_count: u64,
    pub total_views: u64,
    pub video_count: u64,
    pub joined: Option<i64>,
    pub thumbnail: String,
    pub banner: String,
    pub auto_generated: bool,
}
