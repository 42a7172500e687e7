//! Invidious API adapter
//!
//! Endpoints expose `/api/v1/{capability}`. Besides the common capabilities
//! the adapter serves trending lists per category and channel pages.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use super::http::{HttpSettings, InstanceClient, SourceContext};
use super::{
    assemble, checked_id, extension_fields, first_thumbnail, soft, valid_only, Listing,
    SourceAdapter, Thumbnail,
};
use crate::models::{
    CanonicalVideoInfo, ChannelInfo, CommentPage, CommentRecord, ProtocolKind, RawFormat,
    StreamKind, StreamMetadata, StreamResolutionResult,
};
use crate::reconcile::FormatReconciler;
use crate::utils::error::SourceError;
use crate::utils::{de_bool, de_opt_i64, de_string, de_u32, de_u64, de_vec};

const NAME: &str = "invidious";

// ============================================================================
// Wire types
// ============================================================================

/// Video entry of search, trending and channel listings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    #[serde(default, rename = "type", deserialize_with = "de_string")]
    kind: String,
    #[serde(default, alias = "id", deserialize_with = "de_string")]
    video_id: String,
    #[serde(default, deserialize_with = "de_string")]
    title: String,
    #[serde(default, deserialize_with = "de_string")]
    description: String,
    #[serde(default, deserialize_with = "de_vec")]
    video_thumbnails: Vec<Thumbnail>,
    #[serde(default, deserialize_with = "de_u64")]
    length_seconds: u64,
    #[serde(default, deserialize_with = "de_u64")]
    view_count: u64,
    #[serde(default, deserialize_with = "de_string")]
    author: String,
    #[serde(default, deserialize_with = "de_string")]
    author_id: String,
    #[serde(default, deserialize_with = "de_string")]
    published_text: String,
    #[serde(default, deserialize_with = "de_opt_i64")]
    published: Option<i64>,
    #[serde(flatten)]
    rest: BTreeMap<String, Value>,
}

impl VideoItem {
    fn is_video(&self) -> bool {
        self.kind.is_empty() || self.kind == "video"
    }

    fn into_canonical(self) -> CanonicalVideoInfo {
        CanonicalVideoInfo {
            thumbnail: first_thumbnail(&self.video_thumbnails),
            id: self.video_id,
            title: self.title,
            duration_secs: self.length_seconds,
            author: self.author,
            author_id: self.author_id,
            published: self.published,
            published_text: self.published_text,
            view_count: self.view_count,
            description: self.description,
            extra: extension_fields(self.rest),
        }
    }
}

/// Stream entry of `formatStreams` and `adaptiveFormats`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamEntry {
    #[serde(default, deserialize_with = "de_string")]
    url: String,
    /// Mime type, e.g. `video/mp4; codecs="avc1"`
    #[serde(default, rename = "type", deserialize_with = "de_string")]
    mime_type: String,
    #[serde(default, deserialize_with = "de_string")]
    quality_label: String,
    #[serde(default, deserialize_with = "de_string")]
    resolution: String,
    /// `"1280x720"`
    #[serde(default, deserialize_with = "de_string")]
    size: String,
    #[serde(default, deserialize_with = "de_u64")]
    bitrate: u64,
    #[serde(default, deserialize_with = "de_u32")]
    fps: u32,
    #[serde(default, deserialize_with = "de_string")]
    container: String,
}

impl StreamEntry {
    fn to_raw(&self, kind: StreamKind) -> RawFormat {
        let quality = match kind {
            StreamKind::AudioOnly => "audio".to_string(),
            _ => self.quality_label.clone(),
        };
        let resolution = if self.size.is_empty() {
            self.resolution.clone()
        } else {
            self.size.clone()
        };

        RawFormat::new(self.url.clone(), quality, kind)
            .with_resolution(resolution)
            .with_bitrate(self.bitrate)
            .with_fps(if self.fps == 0 { 30 } else { self.fps })
            .with_ext(if self.container.is_empty() {
                "mp4".to_string()
            } else {
                self.container.clone()
            })
    }
}

/// `videos/{id}` payload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoDetails {
    #[serde(flatten)]
    item: VideoItem,
    #[serde(default, deserialize_with = "de_vec")]
    format_streams: Vec<StreamEntry>,
    #[serde(default, deserialize_with = "de_vec")]
    adaptive_formats: Vec<StreamEntry>,
}

impl VideoDetails {
    /// Muxed streams first, then adaptive video, then adaptive audio
    fn raw_formats(&self) -> Vec<RawFormat> {
        let muxed = self
            .format_streams
            .iter()
            .filter(|f| !f.url.is_empty() && !f.quality_label.is_empty())
            .map(|f| f.to_raw(StreamKind::Muxed));

        let video = self
            .adaptive_formats
            .iter()
            .filter(|f| f.mime_type.starts_with("video/"))
            .filter(|f| !f.url.is_empty() && !f.quality_label.is_empty())
            .map(|f| f.to_raw(StreamKind::VideoOnly));

        let audio = self
            .adaptive_formats
            .iter()
            .filter(|f| f.mime_type.starts_with("audio/") && !f.url.is_empty())
            .map(|f| f.to_raw(StreamKind::AudioOnly));

        muxed.chain(video).chain(audio).collect()
    }

    fn metadata(&self) -> StreamMetadata {
        StreamMetadata {
            title: self.item.title.clone(),
            duration_secs: self.item.length_seconds,
            thumbnail: first_thumbnail(&self.item.video_thumbnails),
            uploader: self.item.author.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Replies {
    #[serde(default, deserialize_with = "de_u64")]
    reply_count: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentItem {
    #[serde(default, deserialize_with = "de_string")]
    author: String,
    #[serde(default, deserialize_with = "de_string")]
    author_id: String,
    #[serde(default, deserialize_with = "de_vec")]
    author_thumbnails: Vec<Thumbnail>,
    #[serde(default, deserialize_with = "de_string")]
    content: String,
    #[serde(default, deserialize_with = "de_opt_i64")]
    published: Option<i64>,
    #[serde(default, deserialize_with = "de_string")]
    published_text: String,
    #[serde(default, deserialize_with = "de_u64")]
    like_count: u64,
    #[serde(default)]
    replies: Option<Replies>,
    #[serde(default, deserialize_with = "de_bool")]
    author_is_channel_owner: bool,
    #[serde(default, deserialize_with = "de_bool")]
    is_pinned: bool,
}

impl From<CommentItem> for CommentRecord {
    fn from(item: CommentItem) -> Self {
        Self {
            author_thumbnail: first_thumbnail(&item.author_thumbnails),
            author: item.author,
            author_id: item.author_id,
            content: item.content,
            published: item.published,
            published_text: item.published_text,
            like_count: item.like_count,
            reply_count: item.replies.map(|r| r.reply_count).unwrap_or(0),
            is_owner: item.author_is_channel_owner,
            is_pinned: item.is_pinned,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentsResponse {
    #[serde(default, deserialize_with = "de_vec")]
    comments: Vec<CommentItem>,
    #[serde(default, deserialize_with = "crate::utils::de_opt_string")]
    continuation: Option<String>,
    #[serde(default)]
    comment_count: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelResponse {
    #[serde(default, deserialize_with = "de_string")]
    author: String,
    #[serde(default, deserialize_with = "de_string")]
    author_id: String,
    #[serde(default, deserialize_with = "de_string")]
    description: String,
    #[serde(default, deserialize_with = "de_u64")]
    sub_count: u64,
    #[serde(default, deserialize_with = "de_u64")]
    total_views: u64,
    #[serde(default, deserialize_with = "de_u64")]
    video_count: u64,
    #[serde(default, deserialize_with = "de_opt_i64")]
    joined: Option<i64>,
    #[serde(default, deserialize_with = "de_vec")]
    author_thumbnails: Vec<Thumbnail>,
    #[serde(default, deserialize_with = "de_vec")]
    author_banners: Vec<Thumbnail>,
    #[serde(default, deserialize_with = "de_bool")]
    auto_generated: bool,
}

// ============================================================================
// Adapter
// ============================================================================

/// Adapter for the Invidious protocol
pub struct InvidiousSource {
    http: InstanceClient,
    reconciler: FormatReconciler,
}

impl InvidiousSource {
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
            http: InstanceClient::new(ProtocolKind::Invidious, "api/v1", settings, context)?,
            reconciler,
        })
    }

    async fn details(&self, id: &str) -> Result<VideoDetails, SourceError> {
        let id = checked_id(id)?;
        self.http
            .get_json("videos", &format!("videos/{id}"), &[])
            .await
    }

    async fn channel_response(&self, channel_id: &str) -> Result<ChannelResponse, SourceError> {
        let channel_id = checked_id(channel_id)?;
        self.http
            .get_json("channel", &format!("channels/{channel_id}"), &[])
            .await
    }

    async fn comment_response(
        &self,
        id: &str,
        continuation: Option<&str>,
    ) -> Result<CommentsResponse, SourceError> {
        let id = checked_id(id)?;
        self.http
            .get_json(
                "comments",
                &format!("comments/{id}"),
                &[("continuation", continuation.unwrap_or_default())],
            )
            .await
    }

    async fn video_list(
        &self,
        capability: &'static str,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<CanonicalVideoInfo>, SourceError> {
        let listing: Listing<VideoItem> = self.http.get_json(capability, path, params).await?;
        Ok(valid_only(
            listing
                .into_items()
                .into_iter()
                .filter(VideoItem::is_video)
                .map(VideoItem::into_canonical)
                .collect(),
        ))
    }

    /// Trending list of one category (`Music`, `Gaming`, ...)
    pub async fn trending_category(&self, region: &str, category: &str) -> Vec<CanonicalVideoInfo> {
        let result = self
            .video_list("trending", "trending", &[("region", region), ("type", category)])
            .await;
        soft(NAME, "trending", result)
    }

    /// Channel summary
    pub async fn channel(&self, channel_id: &str) -> Option<ChannelInfo> {
        let result = self.channel_response(channel_id).await;
        let channel = soft(NAME, "channel", result.map(Some))?;
        Some(ChannelInfo {
            author_id: if channel.author_id.is_empty() {
                channel_id.to_string()
            } else {
                channel.author_id
            },
            author: channel.author,
            description: channel.description,
            subscriber_count: channel.sub_count,
            total_views: channel.total_views,
            video_count: channel.video_count,
            joined: channel.joined,
            thumbnail: first_thumbnail(&channel.author_thumbnails),
            banner: first_thumbnail(&channel.author_banners),
            auto_generated: channel.auto_generated,
        })
    }

    /// Videos uploaded by a channel, `sort` is `newest`, `oldest` or `popular`
    pub async fn channel_videos(
        &self,
        channel_id: &str,
        page: u32,
        sort: &str,
    ) -> Vec<CanonicalVideoInfo> {
        let channel_id = match checked_id(channel_id) {
            Ok(id) => id,
            Err(e) => return soft(NAME, "channel_videos", Err(e)),
        };
        let page = page.max(1).to_string();
        let result = self
            .video_list(
                "channel_videos",
                &format!("channels/{channel_id}/videos"),
                &[("page", page.as_str()), ("sort_by", sort)],
            )
            .await;
        soft(NAME, "channel_videos", result)
    }
}

#[async_trait]
impl SourceAdapter for InvidiousSource {
    fn name(&self) -> &str {
        NAME
    }

    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Invidious
    }

    async fn search(&self, query: &str, page: u32) -> Vec<CanonicalVideoInfo> {
        let page = page.max(1).to_string();
        let result = self
            .video_list(
                "search",
                "search",
                &[("q", query), ("page", page.as_str()), ("sort_by", "relevance"), ("type", "video")],
            )
            .await;
        soft(NAME, "search", result)
    }

    async fn video_info(&self, id: &str) -> Option<CanonicalVideoInfo> {
        let details = soft(NAME, "video_info", self.details(id).await.map(Some))?;
        let mut info = details.item.into_canonical();
        if info.id.is_empty() {
            info.id = id.to_string();
        }
        Some(info)
    }

    async fn resolve_stream(&self, id: &str) -> Result<StreamResolutionResult, SourceError> {
        let details = self.details(id).await?;
        assemble(
            &self.reconciler,
            id,
            details.metadata(),
            &details.raw_formats(),
            ProtocolKind::Invidious,
        )
    }

    async fn trending(&self, region: &str) -> Vec<CanonicalVideoInfo> {
        let result = self
            .video_list("trending", "trending", &[("region", region)])
            .await;
        soft(NAME, "trending", result)
    }

    async fn comments(&self, id: &str, continuation: Option<&str>) -> CommentPage {
        let response = soft(NAME, "comments", self.comment_response(id, continuation).await);
        CommentPage {
            comment_count: response
                .comment_count
                .as_ref()
                .map(crate::utils::value_to_u64),
            continuation: response.continuation,
            comments: response.comments.into_iter().map(CommentRecord::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn details() -> VideoDetails {
        serde_json::from_value(json!({
            "videoId": "abc",
            "title": "Test",
            "lengthSeconds": "215",
            "author": "Uploader",
            "videoThumbnails": [{"url": "https://img/abc.jpg", "quality": "maxres"}],
            "formatStreams": [
                {"url": "https://cdn/18", "qualityLabel": "360p", "type": "video/mp4", "size": "640x360", "container": "mp4"},
                {"url": "https://cdn/22", "qualityLabel": "720p", "type": "video/mp4", "size": "1280x720"}
            ],
            "adaptiveFormats": [
                {"url": "https://cdn/137", "qualityLabel": "1080p", "type": "video/mp4; codecs=\"avc1\"", "bitrate": "4000000", "fps": 30},
                {"url": "https://cdn/140", "type": "audio/mp4; codecs=\"mp4a\"", "bitrate": "130000"},
                {"url": "https://cdn/251", "type": "audio/webm; codecs=\"opus\"", "bitrate": "160000"},
                {"url": "", "qualityLabel": "480p", "type": "video/mp4"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_raw_formats_classification() {
        let raw = details().raw_formats();
        let kinds: Vec<_> = raw.iter().map(|f| (f.quality.as_str(), f.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("360p", StreamKind::Muxed),
                ("720p", StreamKind::Muxed),
                ("1080p", StreamKind::VideoOnly),
                ("audio", StreamKind::AudioOnly),
                ("audio", StreamKind::AudioOnly),
            ]
        );
        assert_eq!(raw[0].resolution, "640x360");
        assert_eq!(raw[2].bitrate, 4_000_000);
    }

    #[test]
    fn test_reconciled_stream() {
        let details = details();
        let result = assemble(
            &FormatReconciler::default(),
            "abc",
            details.metadata(),
            &details.raw_formats(),
            ProtocolKind::Invidious,
        )
        .unwrap();

        let labels: Vec<_> = result.formats.iter().map(|f| f.quality.as_str()).collect();
        assert_eq!(labels, vec!["360p", "1080p", "720p"]);
        assert_eq!(result.best_url, "https://cdn/18");
        assert!(result.has_audio);
        assert_eq!(result.formats[1].audio_url.as_deref(), Some("https://cdn/251"));
        assert_eq!(result.formats[2].audio_url.as_deref(), Some("https://cdn/251"));
        assert_eq!(result.title, "Test");
        assert_eq!(result.duration_secs, 215);
        assert_eq!(result.thumbnail, "https://img/abc.jpg");
    }

    #[test]
    fn test_unmapped_scalars_kept_as_extra() {
        let details: VideoDetails = serde_json::from_value(json!({
            "videoId": "abc",
            "title": "Test",
            "genre": "Music",
            "liveNow": false,
            "likeCount": 12,
            "keywords": ["a", "b"],
            "formatStreams": []
        }))
        .unwrap();

        let info = details.item.into_canonical();

        assert_eq!(info.extra.get("genre"), Some(&json!("Music")));
        assert_eq!(info.extra.get("liveNow"), Some(&json!(false)));
        assert_eq!(info.extra.get("likeCount"), Some(&json!(12)));
        assert!(!info.extra.contains_key("keywords"));
        assert!(!info.extra.contains_key("formatStreams"));
        assert!(!info.extra.contains_key("title"));
    }

    #[test]
    fn test_search_item_defaults() {
        let listing: Listing<VideoItem> = serde_json::from_value(json!([
            {"type": "video", "videoId": "x1", "title": "Cat video"},
            {"type": "channel", "author": "Cats", "authorId": "UC1"},
            {"type": "video", "title": "no id"}
        ]))
        .unwrap();

        let items: Vec<_> = valid_only(
            listing
                .into_items()
                .into_iter()
                .filter(VideoItem::is_video)
                .map(VideoItem::into_canonical)
                .collect(),
        );

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "x1");
        assert_eq!(items[0].duration_secs, 0);
        assert_eq!(items[0].thumbnail, "");
    }

    #[test]
    fn test_comment_conversion() {
        let response: CommentsResponse = serde_json::from_value(json!({
            "commentCount": 12,
            "continuation": "next-token",
            "comments": [{
                "author": "viewer",
                "content": "nice",
                "likeCount": 3,
                "replies": {"replyCount": 2},
                "authorIsChannelOwner": true
            }]
        }))
        .unwrap();

        let record = CommentRecord::from(response.comments[0].clone());
        assert_eq!(record.reply_count, 2);
        assert!(record.is_owner);
        assert!(!record.is_pinned);
        assert_eq!(response.continuation.as_deref(), Some("next-token"));
    }
}
