//! Companion batch-extraction helper adapter
//!
//! The helper answers three commands: `stream` (one id), `batch` (several
//! ids in one call) and `search`. A stream reply carries a preferred
//! `formats` triple (combined, video, audio) and the full `allFormats` list.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

use super::worker::{WorkerClient, WorkerRequest};
use super::{
    assemble, checked_id, extension_fields, lenient_items, soft, valid_only, SourceAdapter,
};
use crate::models::{
    CanonicalVideoInfo, ProtocolKind, RawFormat, StreamKind, StreamMetadata,
    StreamResolutionResult,
};
use crate::reconcile::FormatReconciler;
use crate::utils::error::SourceError;
use crate::utils::{de_bool, de_string, de_u64, de_vec, value_to_string};

const NAME: &str = "batch_worker";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HelperFormat {
    #[serde(default, deserialize_with = "de_string")]
    url: String,
    #[serde(default, deserialize_with = "de_string")]
    quality: String,
    #[serde(default, deserialize_with = "de_bool")]
    has_audio: bool,
    #[serde(default, deserialize_with = "de_bool")]
    has_video: bool,
    #[serde(default, deserialize_with = "de_string")]
    container: String,
    #[serde(default, deserialize_with = "de_u64")]
    bitrate: u64,
}

impl HelperFormat {
    fn to_raw(&self) -> Option<RawFormat> {
        if self.url.is_empty() {
            return None;
        }

        let kind = match (self.has_video, self.has_audio) {
            (true, true) => StreamKind::Muxed,
            (true, false) => StreamKind::VideoOnly,
            (false, true) => StreamKind::AudioOnly,
            (false, false) => return None,
        };
        let quality = match kind {
            StreamKind::AudioOnly => "audio".to_string(),
            _ if self.quality.is_empty() => return None,
            _ => self.quality.clone(),
        };

        Some(
            RawFormat::new(self.url.clone(), quality, kind)
                .with_bitrate(self.bitrate)
                .with_ext(if self.container.is_empty() {
                    "mp4".to_string()
                } else {
                    self.container.clone()
                }),
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PreferredFormats {
    #[serde(default)]
    combined: Option<HelperFormat>,
    #[serde(default)]
    video: Option<HelperFormat>,
    #[serde(default)]
    audio: Option<HelperFormat>,
}

/// Reply to a `stream` command, also the element of a `batch` reply
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamPayload {
    #[serde(default, deserialize_with = "de_string")]
    video_id: String,
    #[serde(default, deserialize_with = "de_string")]
    title: String,
    #[serde(default, deserialize_with = "de_u64")]
    duration: u64,
    #[serde(default, deserialize_with = "de_string")]
    author: String,
    #[serde(default, deserialize_with = "de_string")]
    thumbnail: String,
    #[serde(default)]
    formats: PreferredFormats,
    #[serde(default, deserialize_with = "de_vec")]
    all_formats: Vec<HelperFormat>,
    #[serde(flatten)]
    rest: BTreeMap<String, Value>,
}

impl StreamPayload {
    /// Preferred formats first so they win label de-duplication
    fn raw_formats(&self) -> Vec<RawFormat> {
        let preferred = [
            self.formats.combined.as_ref().map(|f| (f, StreamKind::Muxed)),
            self.formats.video.as_ref().map(|f| (f, StreamKind::VideoOnly)),
            self.formats.audio.as_ref().map(|f| (f, StreamKind::AudioOnly)),
        ];

        preferred
            .into_iter()
            .flatten()
            .filter_map(|(format, kind)| {
                let mut format = format.clone();
                format.has_video = kind != StreamKind::AudioOnly;
                format.has_audio = kind != StreamKind::VideoOnly;
                format.to_raw()
            })
            .chain(self.all_formats.iter().filter_map(HelperFormat::to_raw))
            .collect()
    }

    fn metadata(&self) -> StreamMetadata {
        StreamMetadata {
            title: self.title.clone(),
            duration_secs: self.duration,
            thumbnail: self.thumbnail.clone(),
            uploader: self.author.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct BatchPayload {
    #[serde(default, deserialize_with = "de_vec")]
    videos: Vec<StreamPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItem {
    #[serde(default, deserialize_with = "de_string")]
    id: String,
    #[serde(default, deserialize_with = "de_string")]
    title: String,
    #[serde(default, deserialize_with = "de_string")]
    author: String,
    #[serde(default, deserialize_with = "de_u64")]
    duration: u64,
    #[serde(default, deserialize_with = "de_string")]
    thumbnail: String,
    /// Display text such as `"1,234 views"`
    #[serde(default)]
    views: Value,
    #[serde(default, deserialize_with = "de_string")]
    published_time: String,
    #[serde(flatten)]
    rest: BTreeMap<String, Value>,
}

/// Leading number of a display count ("1,234 views" -> 1234)
fn parse_count_text(value: &Value) -> u64 {
    if let Some(n) = value.as_u64() {
        return n;
    }
    let text = value_to_string(value);
    let digits: String = text
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    digits.parse().unwrap_or(0)
}

impl From<SearchItem> for CanonicalVideoInfo {
    fn from(item: SearchItem) -> Self {
        Self {
            view_count: parse_count_text(&item.views),
            id: item.id,
            title: item.title,
            duration_secs: item.duration,
            author: item.author,
            author_id: String::new(),
            thumbnail: item.thumbnail,
            published: None,
            published_text: item.published_time,
            description: String::new(),
            extra: extension_fields(item.rest),
        }
    }
}

/// Adapter for the companion batch-extraction helper
pub struct BatchWorkerSource {
    worker: Arc<dyn WorkerClient>,
    reconciler: FormatReconciler,
    quality: String,
    search_limit: usize,
}

impl BatchWorkerSource {
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

    async fn stream(&self, id: &str) -> Result<StreamPayload, SourceError> {
        let id = checked_id(id)?;
        let request = WorkerRequest::Stream {
            id: id.to_string(),
            quality: self.quality.clone(),
        };
        Ok(serde_json::from_value(self.worker.call(&request).await?)?)
    }

    fn to_result(&self, id: &str, payload: &StreamPayload) -> Result<StreamResolutionResult, SourceError> {
        assemble(
            &self.reconciler,
            id,
            payload.metadata(),
            &payload.raw_formats(),
            ProtocolKind::BatchWorker,
        )
    }

    /// Resolve several ids with one helper call, results in input order
    pub async fn resolve_many(
        &self,
        ids: &[String],
    ) -> Vec<(String, Result<StreamResolutionResult, SourceError>)> {
        let request = WorkerRequest::Batch {
            ids: ids.to_vec(),
            quality: self.quality.clone(),
        };

        let payload: Result<BatchPayload, SourceError> = match self.worker.call(&request).await {
            Ok(value) => serde_json::from_value(value).map_err(SourceError::from),
            Err(e) => Err(e),
        };

        let payload = match payload {
            Ok(payload) => payload,
            Err(e) => {
                let message = e.to_string();
                return ids
                    .iter()
                    .map(|id| (id.clone(), Err(SourceError::Worker(message.clone()))))
                    .collect();
            }
        };

        let by_id: HashMap<&str, &StreamPayload> = payload
            .videos
            .iter()
            .map(|video| (video.video_id.as_str(), video))
            .collect();

        ids.iter()
            .map(|id| {
                let result = match by_id.get(id.as_str()) {
                    Some(video) => self.to_result(id, video),
                    None => Err(SourceError::Worker(format!("{id} missing from batch reply"))),
                };
                (id.clone(), result)
            })
            .collect()
    }
}

#[async_trait]
impl SourceAdapter for BatchWorkerSource {
    fn name(&self) -> &str {
        NAME
    }

    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::BatchWorker
    }

    /// The helper serves a single page of results
    async fn search(&self, query: &str, page: u32) -> Vec<CanonicalVideoInfo> {
        if page > 1 {
            return Vec::new();
        }

        let request = WorkerRequest::Search {
            query: query.to_string(),
            limit: self.search_limit,
        };
        let reply = soft(NAME, "search", self.worker.call(&request).await);
        valid_only(
            lenient_items::<SearchItem>(reply)
                .into_iter()
                .map(CanonicalVideoInfo::from)
                .collect(),
        )
    }

    async fn video_info(&self, id: &str) -> Option<CanonicalVideoInfo> {
        let payload = soft(NAME, "video_info", self.stream(id).await.map(Some))?;
        Some(CanonicalVideoInfo {
            id: id.to_string(),
            title: payload.title,
            duration_secs: payload.duration,
            author: payload.author,
            thumbnail: payload.thumbnail,
            extra: extension_fields(payload.rest),
            ..Default::default()
        })
    }

    async fn resolve_stream(&self, id: &str) -> Result<StreamResolutionResult, SourceError> {
        let payload = self.stream(id).await?;
        self.to_result(id, &payload)
    }
}

/// Batch tier shared by the ids of one multi-id request
///
/// The first id that reaches this tier fetches every id of the request in a
/// single `batch` call; later ids take their answer from that reply. An id
/// the reply does not cover falls back to a single `stream` call.
pub struct BatchSession {
    source: Arc<BatchWorkerSource>,
    ids: Vec<String>,
    results: OnceCell<Mutex<HashMap<String, Result<StreamResolutionResult, SourceError>>>>,
}

impl BatchSession {
    pub fn new(source: Arc<BatchWorkerSource>, ids: Vec<String>) -> Self {
        Self {
            source,
            ids,
            results: OnceCell::new(),
        }
    }

    async fn take(&self, id: &str) -> Option<Result<StreamResolutionResult, SourceError>> {
        let results = self
            .results
            .get_or_init(|| async {
                tracing::debug!(count = self.ids.len(), "Batch helper call");
                Mutex::new(self.source.resolve_many(&self.ids).await.into_iter().collect())
            })
            .await;
        results.lock().await.remove(id)
    }
}

#[async_trait]
impl SourceAdapter for BatchSession {
    fn name(&self) -> &str {
        NAME
    }

    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::BatchWorker
    }

    async fn resolve_stream(&self, id: &str) -> Result<StreamResolutionResult, SourceError> {
        match self.take(id).await {
            Some(result) => result,
            None => self.source.resolve_stream(id).await,
        }
    }
}
