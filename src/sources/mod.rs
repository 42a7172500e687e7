//! Source adapters
//!
//! One adapter per external protocol. Each adapter builds requests for the
//! capabilities it supports and normalizes the reply into the canonical
//! models. Metadata capabilities fail soft: any transport or parse problem
//! yields an empty sequence or `None`. Stream resolution reports a
//! [`SourceError`] so the resolver can record why a tier failed.

pub mod batch;
pub mod extractor;
pub mod http;
pub mod invidious;
pub mod mirror;
pub mod piped;
pub mod worker;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::models::{
    CanonicalVideoInfo, CommentPage, ProtocolKind, RawFormat, StreamMetadata,
    StreamResolutionResult,
};
use crate::reconcile::FormatReconciler;
use crate::utils::error::SourceError;
use crate::utils::{de_string, is_valid_content_id};

pub use batch::{BatchSession, BatchWorkerSource};
pub use extractor::LocalExtractorSource;
pub use http::{HttpSettings, InstanceClient, SourceContext};
pub use invidious::InvidiousSource;
pub use mirror::MirrorSource;
pub use piped::PipedSource;
pub use worker::{CommandWorker, WorkerClient, WorkerDialect, WorkerRequest};

/// Capabilities every source protocol may offer
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Name used in logs and tier failure reports
    fn name(&self) -> &str;

    fn protocol(&self) -> ProtocolKind;

    async fn search(&self, _query: &str, _page: u32) -> Vec<CanonicalVideoInfo> {
        Vec::new()
    }

    async fn video_info(&self, _id: &str) -> Option<CanonicalVideoInfo> {
        None
    }

    /// Resolve playable formats for a content id
    async fn resolve_stream(&self, id: &str) -> Result<StreamResolutionResult, SourceError>;

    async fn trending(&self, _region: &str) -> Vec<CanonicalVideoInfo> {
        Vec::new()
    }

    async fn comments(&self, _id: &str, _continuation: Option<&str>) -> CommentPage {
        CommentPage::default()
    }
}

/// Collapse a soft capability failure into the capability's empty value
pub(crate) fn soft<T: Default>(source: &str, capability: &str, result: Result<T, SourceError>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(source, capability, error = %e, "Capability returned nothing");
            T::default()
        }
    }
}

/// Reject ids that would escape their path segment or argument slot
pub(crate) fn checked_id(id: &str) -> Result<&str, SourceError> {
    if is_valid_content_id(id) {
        Ok(id)
    } else {
        Err(SourceError::InvalidId(id.to_string()))
    }
}

/// Scalar wire fields without a canonical slot, kept as `extra`
pub(crate) fn extension_fields(rest: BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    rest.into_iter()
        .filter(|(_, value)| matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_)))
        .collect()
}

/// Keep only records carrying an identifier
pub(crate) fn valid_only(items: Vec<CanonicalVideoInfo>) -> Vec<CanonicalVideoInfo> {
    items.into_iter().filter(CanonicalVideoInfo::is_valid).collect()
}

/// Reconcile raw formats and wrap them with metadata
pub(crate) fn assemble(
    reconciler: &FormatReconciler,
    content_id: &str,
    metadata: StreamMetadata,
    raw: &[RawFormat],
    source: ProtocolKind,
) -> Result<StreamResolutionResult, SourceError> {
    let formats = reconciler.reconcile(raw);
    StreamResolutionResult::from_formats(content_id, metadata, formats, source)
        .ok_or(SourceError::NoFormats)
}

// ============================================================================
// Shared wire shapes
// ============================================================================

/// A result list given either flat or wrapped in an object
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Flat(Vec<T>),
    Wrapped {
        #[serde(alias = "videos", alias = "results", default = "Vec::new")]
        items: Vec<T>,
    },
}

impl<T> Listing<T> {
    pub fn into_items(self) -> Vec<T> {
        match self {
            Self::Flat(items) | Self::Wrapped { items } => items,
        }
    }
}

impl<T> Default for Listing<T> {
    fn default() -> Self {
        Self::Flat(Vec::new())
    }
}

/// Decode a listing leniently: items that do not fit the shape are skipped
pub fn lenient_items<T: DeserializeOwned>(value: serde_json::Value) -> Vec<T> {
    let raw_items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => ["items", "videos", "results"]
            .iter()
            .find_map(|field| match map.remove(*field) {
                Some(serde_json::Value::Array(items)) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    raw_items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect()
}

/// Image entry of a thumbnail list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    #[serde(default, deserialize_with = "de_string")]
    pub url: String,
}

/// First non-empty thumbnail URL
pub fn first_thumbnail(thumbnails: &[Thumbnail]) -> String {
    thumbnails
        .iter()
        .find(|t| !t.url.is_empty())
        .map(|t| t.url.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: String,
    }

    #[test]
    fn test_listing_flat_and_wrapped() {
        let flat: Listing<Item> = serde_json::from_value(json!([{"id": "a"}])).unwrap();
        assert_eq!(flat.into_items(), vec![Item { id: "a".into() }]);

        let wrapped: Listing<Item> =
            serde_json::from_value(json!({"items": [{"id": "b"}], "nextpage": null})).unwrap();
        assert_eq!(wrapped.into_items(), vec![Item { id: "b".into() }]);

        let videos: Listing<Item> = serde_json::from_value(json!({"videos": [{"id": "c"}]})).unwrap();
        assert_eq!(videos.into_items(), vec![Item { id: "c".into() }]);
    }

    #[test]
    fn test_lenient_items_skips_bad_entries() {
        let items: Vec<Item> = lenient_items(json!({"items": [{"id": "a"}, {"nope": 1}, 3]}));
        assert_eq!(items, vec![Item { id: "a".into() }]);
        assert!(lenient_items::<Item>(json!("garbage")).is_empty());
    }

    #[test]
    fn test_first_thumbnail() {
        let thumbs = vec![Thumbnail::default(), Thumbnail { url: "https://i/1.jpg".into() }];
        assert_eq!(first_thumbnail(&thumbs), "https://i/1.jpg");
        assert_eq!(first_thumbnail(&[]), "");
    }

    #[test]
    fn test_soft_collapses_errors() {
        let empty: Vec<u8> = soft("test", "search", Err(SourceError::Timeout));
        assert!(empty.is_empty());
        assert_eq!(soft("test", "search", Ok(vec![1u8])), vec![1]);
    }
}
