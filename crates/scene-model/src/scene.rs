//! Scenes: one background asset plus its overlay elements.

use serde::{Deserialize, Serialize};

use crate::element::{Element, WireElement};
use crate::error::ModelError;

/// Progress of the optional image-to-clip animation for a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnimationStatus {
    /// The user turned animation off for this scene.
    #[serde(rename = "none")]
    Disabled,
    Pending,
    Processing,
    Completed,
    Failed,
    /// Missing or not one of the known values.
    #[default]
    #[serde(other)]
    Unspecified,
}

/// One scene of the ad.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    /// Sequence index; scenes play in ascending order.
    #[serde(default)]
    pub order: i64,

    /// Seconds on screen.
    pub duration: f64,

    /// Still image for the scene.
    #[serde(default, alias = "imageUrl")]
    pub background_url: Option<String>,

    /// Animated clip generated from the still image.
    #[serde(default, alias = "videoUrl")]
    pub clip_url: Option<String>,

    /// User opt-in for the animated clip.
    #[serde(default)]
    pub animate: bool,

    #[serde(default)]
    pub animation_status: AnimationStatus,

    #[serde(default)]
    pub elements: Vec<WireElement>,
}

impl Scene {
    /// The animated clip is used only when it exists, the user opted in,
    /// and animation was not explicitly switched off.
    pub fn use_animated_version(&self) -> bool {
        let has_clip = self
            .clip_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty());
        has_clip && self.animate && self.animation_status != AnimationStatus::Disabled
    }

    /// Parse the wire elements and return them sorted by ascending
    /// `zIndex`, ties keeping request order. Elements that fail to parse
    /// are returned separately so the caller can log and skip them.
    pub fn elements_in_paint_order(&self) -> (Vec<Element>, Vec<ModelError>) {
        let mut parsed = Vec::with_capacity(self.elements.len());
        let mut rejected = Vec::new();
        for (index, wire) in self.elements.iter().enumerate() {
            match wire.to_element(index) {
                Ok(element) => parsed.push(element),
                Err(err) => rejected.push(err),
            }
        }
        parsed.sort_by_key(|e| e.z_index);
        (parsed, rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scene(value: serde_json::Value) -> Scene {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_animation_status_none_disables_clip() {
        let s = scene(json!({
            "duration": 3.0,
            "clipUrl": "https://cdn/clip.mp4",
            "animate": true,
            "animationStatus": "none"
        }));
        assert_eq!(s.animation_status, AnimationStatus::Disabled);
        assert!(!s.use_animated_version());
    }

    #[test]
    fn test_animated_version_requires_opt_in_and_clip() {
        let s = scene(json!({"duration": 3.0, "clipUrl": "https://cdn/clip.mp4", "animate": false}));
        assert!(!s.use_animated_version());

        let s = scene(json!({"duration": 3.0, "animate": true, "animationStatus": "completed"}));
        assert!(!s.use_animated_version());

        let s = scene(json!({
            "duration": 3.0,
            "videoUrl": "https://cdn/clip.mp4",
            "animate": true,
            "animationStatus": "completed"
        }));
        assert!(s.use_animated_version());
    }

    #[test]
    fn test_unknown_animation_status_is_tolerated() {
        let s = scene(json!({"duration": 1.0, "animationStatus": "queued-for-gpu"}));
        assert_eq!(s.animation_status, AnimationStatus::Unspecified);
    }

    #[test]
    fn test_elements_sorted_by_z_index_stably() {
        let s = scene(json!({
            "duration": 2.0,
            "elements": [
                {"id": "a", "type": "text", "zIndex": 2, "content": "A"},
                {"id": "b", "type": "shape", "zIndex": 1},
                {"id": "c", "type": "sparkle", "zIndex": 0},
                {"id": "d", "type": "text", "zIndex": 1, "content": "D"}
            ]
        }));
        let (elements, rejected) = s.elements_in_paint_order();
        let ids: Vec<&str> = elements.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d", "a"]);
        assert_eq!(rejected.len(), 1);
    }
}
