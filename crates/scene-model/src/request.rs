//! Render requests as submitted by the ad editor.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::scene::Scene;
use crate::target::{AspectFormat, Quality, RenderTarget};

/// A full render request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub scenes: Vec<Scene>,

    #[serde(default = "default_format")]
    pub format: AspectFormat,

    #[serde(default)]
    pub quality: Quality,

    /// Used to name the job's working directory and output file.
    #[serde(default = "default_project_id")]
    pub project_id: String,
}

fn default_format() -> AspectFormat {
    AspectFormat::Portrait
}

fn default_project_id() -> String {
    "project".to_string()
}

impl RenderRequest {
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ModelError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject requests that cannot produce a video at all.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.scenes.is_empty() {
            return Err(ModelError::validation("request has no scenes"));
        }
        for scene in &self.scenes {
            if !scene.duration.is_finite() || scene.duration <= 0.0 {
                return Err(ModelError::validation(format!(
                    "scene {} has invalid duration {}",
                    scene.order, scene.duration
                )));
            }
        }
        Ok(())
    }

    pub fn target(&self) -> RenderTarget {
        RenderTarget::new(self.format.clone(), self.quality)
    }

    /// Scenes sorted by ascending `order`, ties in request order.
    pub fn scenes_in_order(&self) -> Vec<&Scene> {
        let mut scenes: Vec<&Scene> = self.scenes.iter().collect();
        scenes.sort_by_key(|s| s.order);
        scenes
    }

    /// Sum of declared scene durations.
    pub fn total_duration(&self) -> f64 {
        self.scenes.iter().map(|s| s.duration).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUEST: &str = r#"{
        "projectId": "spring-sale",
        "format": "16:9",
        "quality": "high",
        "scenes": [
            {"order": 2, "duration": 3.0, "backgroundUrl": "https://cdn/b.png"},
            {"order": 1, "duration": 2.0, "backgroundUrl": "https://cdn/a.png",
             "elements": [{"type": "text", "content": "Hi"}]}
        ]
    }"#;

    #[test]
    fn test_parse_and_order() {
        let req = RenderRequest::from_json(REQUEST).unwrap();
        req.validate().unwrap();
        assert_eq!(req.format, AspectFormat::Landscape);
        assert_eq!(req.quality, Quality::High);
        let ordered: Vec<i64> = req.scenes_in_order().iter().map(|s| s.order).collect();
        assert_eq!(ordered, vec![1, 2]);
        assert!((req.total_duration() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_defaults_when_fields_missing() {
        let req = RenderRequest::from_json(r#"{"scenes": [{"duration": 1.5}]}"#).unwrap();
        assert_eq!(req.format, AspectFormat::Portrait);
        assert_eq!(req.quality, Quality::Medium);
        assert_eq!(req.project_id, "project");
    }

    #[test]
    fn test_validate_rejects_empty_and_bad_durations() {
        let req = RenderRequest::from_json(r#"{"scenes": []}"#).unwrap();
        assert!(matches!(req.validate(), Err(ModelError::ValidationError { .. })));

        let req = RenderRequest::from_json(r#"{"scenes": [{"duration": 0}]}"#).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        assert!(matches!(
            RenderRequest::from_json("{"),
            Err(ModelError::ParseError { .. })
        ));
    }
}
