//! Local extraction tool adapter
//!
//! Drives a yt-dlp compatible worker that dumps one JSON document per
//! request. Video formats below 240p are ignored; when the tool reports no
//! format list at all the top-level `url` is offered as a single muxed
//! 720p format.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::worker::{WorkerClient, WorkerRequest};
use super::{assemble, checked_id, extension_fields, soft, valid_only, SourceAdapter, Thumbnail};
use crate::models::{
    CanonicalVideoInfo, ProtocolKind, RawFormat, StreamKind, StreamMetadata,
    StreamResolutionResult,
};
use crate::reconcile::FormatReconciler;
use crate::utils::error::SourceError;
use crate::utils::{de_opt_i64, de_string, de_u32, de_u64, de_vec};

const NAME: &str = "local_extractor";

/// Lowest video height offered to callers
const MIN_HEIGHT: u32 = 240;

#[derive(Debug, Clone, Default, Deserialize)]
struct ExtractedFormat {
    #[serde(default, deserialize_with = "de_string")]
    url: String,
    #[serde(default, deserialize_with = "de_u32")]
    height: u32,
    #[serde(default, deserialize_with = "de_u32")]
    width: u32,
    #[serde(default, deserialize_with = "de_string")]
    acodec: String,
    #[serde(default, deserialize_with = "de_string")]
    vcodec: String,
    /// Total bitrate in kbit/s
    #[serde(default, deserialize_with = "de_u64")]
    tbr: u64,
    /// Audio bitrate in kbit/s
    #[serde(default, deserialize_with = "de_u64")]
    abr: u64,
    #[serde(default, deserialize_with = "de_u32")]
    fps: u32,
    #[serde(default, deserialize_with = "de_string")]
    ext: String,
}

impl ExtractedFormat {
    fn has_codec(codec: &str) -> bool {
        !codec.is_empty() && codec != "none"
    }

    fn is_audio_only(&self) -> bool {
        self.vcodec == "none" && Self::has_codec(&self.acodec)
    }

    fn to_raw(&self) -> Option<RawFormat> {
        if self.url.is_empty() {
            return None;
        }

        let ext = if self.ext.is_empty() { "mp4" } else { self.ext.as_str() };

        if self.is_audio_only() {
            let kbps = if self.abr > 0 { self.abr } else { self.tbr };
            return Some(
                RawFormat::new(self.url.clone(), "audio", StreamKind::AudioOnly)
                    .with_bitrate(kbps.saturating_mul(1000))
                    .with_ext(ext),
            );
        }

        if self.height < MIN_HEIGHT {
            return None;
        }

        let kind = if Self::has_codec(&self.acodec) {
            StreamKind::Muxed
        } else {
            StreamKind::VideoOnly
        };
        let resolution = if self.width > 0 {
            format!("{}x{}", self.width, self.height)
        } else {
            format!("?x{}", self.height)
        };

        Some(
            RawFormat::new(self.url.clone(), format!("{}p", self.height), kind)
                .with_resolution(resolution)
                .with_bitrate(self.tbr.saturating_mul(1000))
                .with_fps(if self.fps == 0 { 30 } else { self.fps })
                .with_ext(ext),
        )
    }
}

/// Single-video dump, also used for flat search entries
#[derive(Debug, Clone, Default, Deserialize)]
struct ExtractedInfo {
    #[serde(default, deserialize_with = "de_string")]
    id: String,
    #[serde(default, deserialize_with = "de_string")]
    title: String,
    #[serde(default, deserialize_with = "de_u64")]
    duration: u64,
    #[serde(default, deserialize_with = "de_string")]
    uploader: String,
    #[serde(default, deserialize_with = "de_string")]
    channel: String,
    #[serde(default, deserialize_with = "de_string")]
    channel_id: String,
    #[serde(default, deserialize_with = "de_string")]
    uploader_id: String,
    #[serde(default, deserialize_with = "de_string")]
    thumbnail: String,
    #[serde(default, deserialize_with = "de_vec")]
    thumbnails: Vec<Thumbnail>,
    #[serde(default, deserialize_with = "de_u64")]
    view_count: u64,
    #[serde(default, deserialize_with = "de_opt_i64")]
    timestamp: Option<i64>,
    /// `YYYYMMDD`
    #[serde(default, deserialize_with = "de_string")]
    upload_date: String,
    #[serde(default, deserialize_with = "de_string")]
    description: String,
    #[serde(default, deserialize_with = "de_string")]
    url: String,
    #[serde(default, deserialize_with = "de_vec")]
    formats: Vec<ExtractedFormat>,
    #[serde(flatten)]
    rest: BTreeMap<String, Value>,
}

impl ExtractedInfo {
    fn thumbnail(&self) -> String {
        if self.thumbnail.is_empty() {
            // yt-dlp lists thumbnails smallest first
            self.thumbnails
                .iter()
                .rev()
                .find(|t| !t.url.is_empty())
                .map(|t| t.url.clone())
                .unwrap_or_default()
        } else {
            self.thumbnail.clone()
        }
    }

    fn uploader(&self) -> String {
        if self.uploader.is_empty() {
            self.channel.clone()
        } else {
            self.uploader.clone()
        }
    }

    fn author_id(&self) -> String {
        if self.channel_id.is_empty() {
            self.uploader_id.clone()
        } else {
            self.channel_id.clone()
        }
    }

    fn raw_formats(&self) -> Vec<RawFormat> {
        let formats: Vec<RawFormat> = self.formats.iter().filter_map(ExtractedFormat::to_raw).collect();

        if formats.iter().any(|f| !f.is_audio_only()) || self.url.is_empty() {
            return formats;
        }

        vec![RawFormat::new(self.url.clone(), "720p", StreamKind::Muxed).with_resolution("1280x720")]
    }

    fn metadata(&self) -> StreamMetadata {
        StreamMetadata {
            title: self.title.clone(),
            duration_secs: self.duration,
            thumbnail: self.thumbnail(),
            uploader: self.uploader(),
        }
    }

    fn into_canonical(self) -> CanonicalVideoInfo {
        CanonicalVideoInfo {
            thumbnail: self.thumbnail(),
            author: self.uploader(),
            author_id: self.author_id(),
            id: self.id,
            title: self.title,
            duration_secs: self.duration,
            published: self.timestamp,
            published_text: self.upload_date,
            view_count: self.view_count,
            description: self.description,
            extra: extension_fields(self.rest),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SearchDump {
    #[serde(default, deserialize_with = "de_vec")]
    entries: Vec<ExtractedInfo>,
}

/// Adapter for a yt-dlp compatible local extraction tool
pub struct LocalExtractorSource {
    worker: Arc<dyn WorkerClient>,
    reconciler: FormatReconciler,
    quality: String,
    search_limit: usize,
}

impl LocalExtractorSource {
    pub fn new(
        worker: Arc<dyn WorkerClient>,
        reconciler: FormatReconciler,
        quality: impl Into<String>,
    ) -> Self {
        Self {
            worker,
            reconciler,
            quality: quality.into(),
            search_limit: 20,
        }
    }

    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit.max(1);
        self
    }

    async fn dump(&self, id: &str) -> Result<ExtractedInfo, SourceError> {
        let id = checked_id(id)?;
        let request = WorkerRequest::Stream {
            id: id.to_string(),
            quality: self.quality.clone(),
        };
        let value = self.worker.call(&request).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn search_page(&self, query: &str, page: u32) -> Result<Vec<CanonicalVideoInfo>, SourceError> {
        // The tool has no paging; ask for enough results and skip earlier pages
        let page = page.max(1) as usize;
        let request = WorkerRequest::Search {
            query: query.to_string(),
            limit: self.search_limit.saturating_mul(page),
        };
        let dump: SearchDump = serde_json::from_value(self.worker.call(&request).await?)?;

        Ok(valid_only(
            dump.entries
                .into_iter()
                .skip(self.search_limit.saturating_mul(page - 1))
                .map(ExtractedInfo::into_canonical)
                .collect(),
        ))
    }
}

#[async_trait]
impl SourceAdapter for LocalExtractorSource {
    fn name(&self) -> &str {
        NAME
    }

    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::LocalExtractor
    }

    async fn search(&self, query: &str, page: u32) -> Vec<CanonicalVideoInfo> {
        soft(NAME, "search", self.search_page(query, page).await)
    }

    async fn video_info(&self, id: &str) -> Option<CanonicalVideoInfo> {
        let info = soft(NAME, "video_info", self.dump(id).await.map(Some))?;
        let mut info = info.into_canonical();
        if info.id.is_empty() {
            info.id = id.to_string();
        }
        Some(info)
    }

    async fn resolve_stream(&self, id: &str) -> Result<StreamResolutionResult, SourceError> {
        let info = self.dump(id).await?;
        assemble(
            &self.reconciler,
            id,
            info.metadata(),
            &info.raw_formats(),
            ProtocolKind::LocalExtractor,
        )
    }
}
