//! High-quality mirror adapter
//!
//! The mirror only resolves streams: `{base}/api/{id}?token=...` answers
//! either with a single `videoUrl` (plus optional `audioUrl`) or with a
//! `formats` list.

use async_trait::async_trait;
use serde::Deserialize;

use super::http::{HttpSettings, InstanceClient, SourceContext};
use super::{assemble, checked_id, SourceAdapter};
use crate::models::{ProtocolKind, RawFormat, StreamKind, StreamMetadata, StreamResolutionResult};
use crate::reconcile::FormatReconciler;
use crate::utils::error::SourceError;
use crate::utils::{de_bool, de_opt_string, de_string, de_u32, de_u64, de_vec};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MirrorFormat {
    #[serde(default, deserialize_with = "de_string")]
    url: String,
    #[serde(default, deserialize_with = "de_string")]
    quality: String,
    #[serde(default, deserialize_with = "de_string")]
    resolution: String,
    #[serde(default = "default_true", deserialize_with = "de_bool")]
    has_audio: bool,
    #[serde(default, deserialize_with = "de_opt_string")]
    audio_url: Option<String>,
    #[serde(default, deserialize_with = "de_u64")]
    bitrate: u64,
    #[serde(default, deserialize_with = "de_u32")]
    fps: u32,
    #[serde(default, deserialize_with = "de_string")]
    ext: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MirrorResponse {
    #[serde(default, deserialize_with = "de_string")]
    title: String,
    #[serde(default, deserialize_with = "de_u64")]
    duration: u64,
    #[serde(default, deserialize_with = "de_string")]
    thumbnail: String,
    #[serde(default, deserialize_with = "de_string")]
    uploader: String,
    #[serde(default, deserialize_with = "de_opt_string")]
    video_url: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    audio_url: Option<String>,
    #[serde(default, deserialize_with = "de_string")]
    quality: String,
    #[serde(default, deserialize_with = "de_string")]
    resolution: String,
    #[serde(default, deserialize_with = "de_u64")]
    bitrate: u64,
    #[serde(default, deserialize_with = "de_u32")]
    fps: u32,
    #[serde(default, deserialize_with = "de_vec")]
    formats: Vec<MirrorFormat>,
}

/// Format kind from the reported audio flag and companion track
fn kind_for(has_audio: bool, audio_url: &Option<String>) -> StreamKind {
    if has_audio && audio_url.is_none() {
        StreamKind::Muxed
    } else {
        StreamKind::VideoOnly
    }
}

fn or_default(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

impl MirrorResponse {
    fn raw_formats(&self) -> Vec<RawFormat> {
        if let Some(video_url) = &self.video_url {
            let format = RawFormat::new(
                video_url.clone(),
                or_default(&self.quality, "1080p"),
                kind_for(true, &self.audio_url),
            )
            .with_resolution(or_default(&self.resolution, "1920x1080"))
            .with_bitrate(self.bitrate)
            .with_fps(if self.fps == 0 { 60 } else { self.fps })
            .with_audio_url(self.audio_url.clone());
            return vec![format];
        }

        self.formats
            .iter()
            .filter(|f| !f.url.is_empty())
            .map(|f| {
                RawFormat::new(
                    f.url.clone(),
                    or_default(&f.quality, "high"),
                    kind_for(f.has_audio, &f.audio_url),
                )
                .with_resolution(f.resolution.clone())
                .with_bitrate(f.bitrate)
                .with_fps(if f.fps == 0 { 60 } else { f.fps })
                .with_ext(or_default(&f.ext, "mp4"))
                .with_audio_url(f.audio_url.clone())
            })
            .collect()
    }

    fn metadata(&self) -> StreamMetadata {
        StreamMetadata {
            title: self.title.clone(),
            duration_secs: self.duration,
            thumbnail: self.thumbnail.clone(),
            uploader: self.uploader.clone(),
        }
    }
}

/// Last-resort mirror adapter
pub struct MirrorSource {
    http: InstanceClient,
    reconciler: FormatReconciler,
    token: String,
}

impl MirrorSource {
    /// Create the adapter
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Transport` if the HTTP client cannot be created
    pub fn new(
        settings: &HttpSettings,
        context: SourceContext,
        reconciler: FormatReconciler,
        token: impl Into<String>,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            http: InstanceClient::new(ProtocolKind::Mirror, "api", settings, context)?,
            reconciler,
            token: token.into(),
        })
    }
}

#[async_trait]
impl SourceAdapter for MirrorSource {
    fn name(&self) -> &str {
        "mirror"
    }

    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Mirror
    }

    async fn resolve_stream(&self, id: &str) -> Result<StreamResolutionResult, SourceError> {
        let id = checked_id(id)?;
        let response: MirrorResponse = self
            .http
            .get_json("stream", id, &[("token", self.token.as_str())])
            .await?;

        assemble(
            &self.reconciler,
            id,
            response.metadata(),
            &response.raw_formats(),
            ProtocolKind::Mirror,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_video_url_with_audio() {
        let response: MirrorResponse = serde_json::from_value(json!({
            "title": "HQ",
            "videoUrl": "https://hq/video",
            "audioUrl": "https://hq/audio"
        }))
        .unwrap();

        let raw = response.raw_formats();
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].quality, "1080p");
        assert_eq!(raw[0].resolution, "1920x1080");
        assert_eq!(raw[0].fps, 60);
        assert_eq!(raw[0].kind, StreamKind::VideoOnly);

        let result = assemble(
            &FormatReconciler::default(),
            "id",
            response.metadata(),
            &raw,
            ProtocolKind::Mirror,
        )
        .unwrap();
        assert_eq!(result.audio_url.as_deref(), Some("https://hq/audio"));
        assert!(!result.has_audio);
    }

    #[test]
    fn test_single_muxed_video_url() {
        let response: MirrorResponse =
            serde_json::from_value(json!({"videoUrl": "https://hq/video", "quality": "360p"})).unwrap();

        let raw = response.raw_formats();
        assert_eq!(raw[0].kind, StreamKind::Muxed);
        assert_eq!(raw[0].quality, "360p");
    }

    #[test]
    fn test_format_list() {
        let response: MirrorResponse = serde_json::from_value(json!({
            "formats": [
                {"url": "https://hq/1", "quality": "720p", "hasAudio": false, "audioUrl": "https://hq/a"},
                {"url": "", "quality": "480p"},
                {"url": "https://hq/2"}
            ]
        }))
        .unwrap();

        let raw = response.raw_formats();
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[0].kind, StreamKind::VideoOnly);
        assert_eq!(raw[0].audio_url.as_deref(), Some("https://hq/a"));
        assert_eq!(raw[1].quality, "high");
        assert_eq!(raw[1].kind, StreamKind::Muxed);
    }

    #[test]
    fn test_empty_payload_has_no_formats() {
        let response = MirrorResponse::default();
        let result = assemble(
            &FormatReconciler::default(),
            "id",
            response.metadata(),
            &response.raw_formats(),
            ProtocolKind::Mirror,
        );
        assert!(matches!(result, Err(SourceError::NoFormats)));
    }
}
