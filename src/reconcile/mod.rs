//! Format reconciliation
//!
//! Sources report formats as a mix of muxed streams (usually only at low
//! resolutions), video-only streams at higher resolutions and separate
//! audio-only tracks. Reconciliation turns that into one list where:
//!
//! - every video-only stream points at the best available audio track,
//! - quality labels are unique (first emitted wins),
//! - audio-carrying formats come first, each group sorted by resolution.

use serde::{Deserialize, Serialize};

use crate::models::{RawFormat, ReconciledFormat, StreamKind};
use crate::utils::quality_number;

/// Which muxed formats keep their own audio track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioPolicy {
    /// Demote muxed formats to video + best audio when a better track exists
    pub rewrite_muxed: bool,

    /// Quality labels that always stay muxed as-is
    pub native_audio_tiers: Vec<String>,
}

impl Default for AudioPolicy {
    fn default() -> Self {
        Self {
            rewrite_muxed: true,
            native_audio_tiers: vec!["360p".to_string()],
        }
    }
}

impl AudioPolicy {
    /// Never touch muxed formats
    pub fn keep_native() -> Self {
        Self {
            rewrite_muxed: false,
            native_audio_tiers: Vec::new(),
        }
    }

    /// Whether a muxed format at `quality` keeps its native audio
    pub fn keeps_native_audio(&self, quality: &str) -> bool {
        !self.rewrite_muxed || self.native_audio_tiers.iter().any(|tier| tier == quality)
    }
}

/// Merges raw formats into the ordered, audio-resolved list
#[derive(Debug, Clone, Default)]
pub struct FormatReconciler {
    policy: AudioPolicy,
}

impl FormatReconciler {
    pub fn new(policy: AudioPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &AudioPolicy {
        &self.policy
    }

    /// Reconcile formats in source emission order
    pub fn reconcile(&self, raw: &[RawFormat]) -> Vec<ReconciledFormat> {
        let best_audio = best_audio(raw).map(|a| a.url.clone());

        let mut formats: Vec<ReconciledFormat> = Vec::with_capacity(raw.len());
        for format in raw.iter().filter(|f| !f.is_audio_only()) {
            if formats.iter().any(|f| f.quality == format.quality) {
                continue;
            }
            formats.push(self.resolve_audio(format, best_audio.as_deref()));
        }

        if formats.iter().all(|f| quality_number(&f.quality).is_none()) {
            return formats;
        }

        let (mut with_audio, mut video_only): (Vec<_>, Vec<_>) =
            formats.into_iter().partition(|f| f.has_audio);

        // Stable sorts keep emission order among equal resolutions
        with_audio.sort_by_key(|f| std::cmp::Reverse(quality_number(&f.quality).unwrap_or(0)));
        video_only.sort_by_key(|f| std::cmp::Reverse(quality_number(&f.quality).unwrap_or(0)));

        with_audio.extend(video_only);
        with_audio
    }

    fn resolve_audio(&self, format: &RawFormat, best_audio: Option<&str>) -> ReconciledFormat {
        let (has_audio, audio_url) = match (format.kind, best_audio) {
            (StreamKind::Muxed, Some(audio)) if !self.policy.keeps_native_audio(&format.quality) => {
                (false, Some(audio.to_string()))
            }
            (StreamKind::Muxed, _) => (true, None),
            (_, Some(audio)) => (false, Some(audio.to_string())),
            (_, None) => (false, format.audio_url.clone()),
        };

        ReconciledFormat {
            url: format.url.clone(),
            quality: format.quality.clone(),
            resolution: format.resolution.clone(),
            has_audio,
            audio_url,
            bitrate: format.bitrate,
            fps: format.fps,
            ext: format.ext.clone(),
        }
    }
}

/// Audio-only candidate with the highest bitrate, first one on ties
pub fn best_audio(raw: &[RawFormat]) -> Option<&RawFormat> {
    raw.iter()
        .filter(|f| f.is_audio_only() && !f.url.is_empty())
        .fold(None, |best: Option<&RawFormat>, candidate| match best {
            Some(current) if current.bitrate >= candidate.bitrate => Some(current),
            _ => Some(candidate),
        })
}

/// Best pick of a reconciled list
pub fn best(formats: &[ReconciledFormat]) -> Option<&ReconciledFormat> {
    formats.first()
}
