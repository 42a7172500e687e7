//! Piped API adapter
//!
//! Piped endpoints serve capabilities at the root (`search`, `streams/{id}`,
//! `comments/{id}`, `trending`). Video references arrive as watch paths
//! (`/watch?v=ID`) and uploaders as channel paths (`/channel/ID`).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use super::http::{HttpSettings, InstanceClient, SourceContext};
use super::{assemble, checked_id, extension_fields, soft, valid_only, Listing, SourceAdapter};
use crate::models::{
    CanonicalVideoInfo, CommentPage, CommentRecord, ProtocolKind, RawFormat, StreamKind,
    StreamMetadata, StreamResolutionResult,
};
use crate::reconcile::FormatReconciler;
use crate::utils::error::SourceError;
use crate::utils::{
    de_bool, de_opt_i64, de_opt_string, de_string, de_u32, de_u64, de_vec, strip_id_prefix,
    value_to_u64,
};

const NAME: &str = "piped";

/// Results kept from one search page
const SEARCH_LIMIT: usize = 20;

/// Results kept from a trending list
const TRENDING_LIMIT: usize = 50;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamItem {
    #[serde(default, rename = "type", deserialize_with = "de_string")]
    kind: String,
    /// `/watch?v=ID`
    #[serde(default, deserialize_with = "de_string")]
    url: String,
    #[serde(default, alias = "videoId", deserialize_with = "de_string")]
    id: String,
    #[serde(default, deserialize_with = "de_string")]
    title: String,
    #[serde(default, deserialize_with = "de_string")]
    uploader_name: String,
    #[serde(default, deserialize_with = "de_string")]
    uploader_url: String,
    #[serde(default, deserialize_with = "de_u64")]
    duration: u64,
    #[serde(default, deserialize_with = "de_u64")]
    views: u64,
    #[serde(default, deserialize_with = "de_string")]
    thumbnail: String,
    #[serde(default, deserialize_with = "de_string")]
    uploaded_date: String,
    /// Upload time in milliseconds
    #[serde(default, deserialize_with = "de_opt_i64")]
    uploaded: Option<i64>,
    #[serde(default, deserialize_with = "de_string")]
    short_description: String,
    #[serde(flatten)]
    rest: BTreeMap<String, Value>,
}

impl StreamItem {
    fn is_stream(&self) -> bool {
        self.kind.is_empty() || self.kind == "stream"
    }

    fn into_canonical(self) -> CanonicalVideoInfo {
        let id = if self.id.is_empty() {
            strip_id_prefix(&self.url, &["/watch?v=", "watch?v="]).to_string()
        } else {
            self.id
        };

        CanonicalVideoInfo {
            id,
            title: self.title,
            duration_secs: self.duration,
            author: self.uploader_name,
            author_id: strip_id_prefix(&self.uploader_url, &["/channel/"]).to_string(),
            thumbnail: self.thumbnail,
            published: self.uploaded.filter(|ms| *ms > 0).map(|ms| ms / 1000),
            published_text: self.uploaded_date,
            view_count: self.views,
            description: self.short_description,
            extra: extension_fields(self.rest),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaStream {
    #[serde(default, deserialize_with = "de_string")]
    url: String,
    /// `"720p"` for video, `"128 kbps"` for audio
    #[serde(default, deserialize_with = "de_string")]
    quality: String,
    #[serde(default, deserialize_with = "de_string")]
    mime_type: String,
    #[serde(default, deserialize_with = "de_u64")]
    bitrate: u64,
    #[serde(default, deserialize_with = "de_u32")]
    fps: u32,
    #[serde(default, deserialize_with = "de_u32")]
    width: u32,
    #[serde(default, deserialize_with = "de_u32")]
    height: u32,
    #[serde(default, deserialize_with = "de_bool")]
    video_only: bool,
}

impl MediaStream {
    fn ext(&self) -> String {
        self.mime_type
            .split(';')
            .next()
            .and_then(|mime| mime.split('/').nth(1))
            .filter(|ext| !ext.is_empty())
            .unwrap_or("mp4")
            .to_string()
    }

    fn to_raw(&self, kind: StreamKind) -> RawFormat {
        let quality = match kind {
            StreamKind::AudioOnly => "audio".to_string(),
            _ => self.quality.clone(),
        };
        let resolution = if self.width > 0 && self.height > 0 {
            format!("{}x{}", self.width, self.height)
        } else {
            String::new()
        };

        RawFormat::new(self.url.clone(), quality, kind)
            .with_resolution(resolution)
            .with_bitrate(self.bitrate)
            .with_fps(if self.fps == 0 { 30 } else { self.fps })
            .with_ext(self.ext())
    }
}

/// `streams/{id}` payload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamsResponse {
    #[serde(default, deserialize_with = "de_string")]
    title: String,
    #[serde(default, deserialize_with = "de_string")]
    description: String,
    #[serde(default, deserialize_with = "de_string")]
    uploader: String,
    #[serde(default, deserialize_with = "de_string")]
    uploader_url: String,
    #[serde(default, deserialize_with = "de_string")]
    upload_date: String,
    #[serde(default, deserialize_with = "de_u64")]
    duration: u64,
    #[serde(default, deserialize_with = "de_u64")]
    views: u64,
    #[serde(default, deserialize_with = "de_string")]
    thumbnail_url: String,
    #[serde(default, deserialize_with = "de_vec")]
    video_streams: Vec<MediaStream>,
    #[serde(default, deserialize_with = "de_vec")]
    audio_streams: Vec<MediaStream>,
    #[serde(flatten)]
    rest: BTreeMap<String, Value>,
}

impl StreamsResponse {
    fn raw_formats(&self) -> Vec<RawFormat> {
        let video = self
            .video_streams
            .iter()
            .filter(|s| !s.url.is_empty() && !s.quality.is_empty())
            .map(|s| {
                let kind = if s.video_only {
                    StreamKind::VideoOnly
                } else {
                    StreamKind::Muxed
                };
                s.to_raw(kind)
            });

        let audio = self
            .audio_streams
            .iter()
            .filter(|s| !s.url.is_empty())
            .map(|s| s.to_raw(StreamKind::AudioOnly));

        video.chain(audio).collect()
    }

    fn metadata(&self) -> StreamMetadata {
        StreamMetadata {
            title: self.title.clone(),
            duration_secs: self.duration,
            thumbnail: self.thumbnail_url.clone(),
            uploader: self.uploader.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentItem {
    #[serde(default, deserialize_with = "de_string")]
    author: String,
    #[serde(default, deserialize_with = "de_string")]
    commentor_url: String,
    #[serde(default, deserialize_with = "de_string")]
    thumbnail: String,
    #[serde(default, deserialize_with = "de_string")]
    comment_text: String,
    #[serde(default, deserialize_with = "de_string")]
    commented_time: String,
    #[serde(default, deserialize_with = "de_u64")]
    like_count: u64,
    #[serde(default, deserialize_with = "de_u64")]
    reply_count: u64,
    #[serde(default, deserialize_with = "de_bool")]
    channel_owner: bool,
    #[serde(default, deserialize_with = "de_bool")]
    pinned: bool,
}

impl From<CommentItem> for CommentRecord {
    fn from(item: CommentItem) -> Self {
        Self {
            author: item.author,
            author_id: strip_id_prefix(&item.commentor_url, &["/channel/"]).to_string(),
            author_thumbnail: item.thumbnail,
            content: item.comment_text,
            published: None,
            published_text: item.commented_time,
            like_count: item.like_count,
            reply_count: item.reply_count,
            is_owner: item.channel_owner,
            is_pinned: item.pinned,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentsResponse {
    #[serde(default, deserialize_with = "de_vec")]
    comments: Vec<CommentItem>,
    #[serde(default, deserialize_with = "de_opt_string")]
    nextpage: Option<String>,
    #[serde(default)]
    comment_count: Option<serde_json::Value>,
}

// ============================================================================
// Adapter
// ============================================================================

/// Adapter for the Piped protocol
pub struct PipedSource {
    http: InstanceClient,
    reconciler: FormatReconciler,
}

impl PipedSource {
    /// Create the adapter
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Transport` if the HTTP client cannot be created
    pub fn new(
        settings: &HttpSettings,
        context: SourceContext,
        reconciler: FormatReconciler,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            http: InstanceClient::new(ProtocolKind::Piped, "", settings, context)?,
            reconciler,
        })
    }

    async fn streams(&self, id: &str) -> Result<StreamsResponse, SourceError> {
        let id = checked_id(id)?;
        self.http
            .get_json("streams", &format!("streams/{id}"), &[])
            .await
    }

    fn to_canonical(items: Vec<StreamItem>, limit: usize) -> Vec<CanonicalVideoInfo> {
        let mut videos = valid_only(
            items
                .into_iter()
                .filter(StreamItem::is_stream)
                .map(StreamItem::into_canonical)
                .collect(),
        );
        videos.truncate(limit);
        videos
    }
}

#[async_trait]
impl SourceAdapter for PipedSource {
    fn name(&self) -> &str {
        NAME
    }

    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Piped
    }

    /// Only the first page is served; later pages need a `nextpage` token
    async fn search(&self, query: &str, page: u32) -> Vec<CanonicalVideoInfo> {
        if page > 1 {
            return Vec::new();
        }

        let result: Result<Listing<StreamItem>, _> = self
            .http
            .get_json("search", "search", &[("q", query), ("filter", "videos")])
            .await;

        Self::to_canonical(soft(NAME, "search", result).into_items(), SEARCH_LIMIT)
    }

    async fn video_info(&self, id: &str) -> Option<CanonicalVideoInfo> {
        let streams = soft(NAME, "video_info", self.streams(id).await.map(Some))?;
        Some(CanonicalVideoInfo {
            id: id.to_string(),
            title: streams.title,
            duration_secs: streams.duration,
            author: streams.uploader,
            author_id: strip_id_prefix(&streams.uploader_url, &["/channel/"]).to_string(),
            thumbnail: streams.thumbnail_url,
            published: None,
            published_text: streams.upload_date,
            view_count: streams.views,
            description: streams.description,
            extra: extension_fields(streams.rest),
        })
    }

    async fn resolve_stream(&self, id: &str) -> Result<StreamResolutionResult, SourceError> {
        let streams = self.streams(id).await?;
        assemble(
            &self.reconciler,
            id,
            streams.metadata(),
            &streams.raw_formats(),
            ProtocolKind::Piped,
        )
    }

    async fn trending(&self, region: &str) -> Vec<CanonicalVideoInfo> {
        let result: Result<Listing<StreamItem>, _> = self
            .http
            .get_json("trending", "trending", &[("region", region)])
            .await;

        Self::to_canonical(soft(NAME, "trending", result).into_items(), TRENDING_LIMIT)
    }

    async fn comments(&self, id: &str, continuation: Option<&str>) -> CommentPage {
        let result: Result<CommentsResponse, _> = match checked_id(id) {
            Ok(id) => {
                self.http
                    .get_json(
                        "comments",
                        &format!("comments/{id}"),
                        &[("nextpage", continuation.unwrap_or_default())],
                    )
                    .await
            }
            Err(e) => Err(e),
        };

        let response = soft(NAME, "comments", result);
        CommentPage {
            comment_count: response.comment_count.as_ref().map(value_to_u64),
            continuation: response.nextpage,
            comments: response.comments.into_iter().map(CommentRecord::from).collect(),
        }
    }
}
