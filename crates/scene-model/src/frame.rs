//! The frame list: ordered (file, duration) pairs fed to the final encode.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Shortest duration any entry may carry.
pub const MIN_FRAME_DURATION_SECS: f64 = 0.1;

/// Whether a file holds a still frame or moving video, judged by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Unknown,
}

impl MediaKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "webp" | "bmp" | "gif" => Self::Image,
            "mp4" | "mov" | "webm" | "mkv" | "m4v" | "avi" => Self::Video,
            _ => Self::Unknown,
        }
    }
}

/// One entry of the frame list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameListEntry {
    pub file_path: PathBuf,
    pub duration: f64,
}

impl FrameListEntry {
    /// Durations below the minimum (or non-finite) are raised to it.
    pub fn new(file_path: impl Into<PathBuf>, duration: f64) -> Self {
        let duration = if duration.is_finite() {
            duration.max(MIN_FRAME_DURATION_SECS)
        } else {
            MIN_FRAME_DURATION_SECS
        };
        Self {
            file_path: file_path.into(),
            duration,
        }
    }

    pub fn media_kind(&self) -> MediaKind {
        MediaKind::from_path(&self.file_path)
    }
}

/// Ordered scene media for the final encode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameList {
    entries: Vec<FrameListEntry>,
}

impl FrameList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, file_path: impl Into<PathBuf>, duration: f64) {
        self.entries.push(FrameListEntry::new(file_path, duration));
    }

    pub fn entries(&self) -> &[FrameListEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Expected output duration in seconds.
    pub fn total_duration(&self) -> f64 {
        self.entries.iter().map(|e| e.duration).sum()
    }

    /// True when stills and clips are interleaved in one list. Unknown
    /// extensions count as their own kind.
    pub fn is_mixed(&self) -> bool {
        let mut kinds = self.entries.iter().map(FrameListEntry::media_kind);
        match kinds.next() {
            Some(first) => kinds.any(|k| k != first),
            None => false,
        }
    }

    pub fn has_video(&self) -> bool {
        self.entries
            .iter()
            .any(|e| e.media_kind() == MediaKind::Video)
    }
}
