//! Scene asset processing.
//!
//! Downloads each scene's media into the job workspace, choosing the
//! animated clip or the still image. A scene whose media cannot be fetched
//! at all gets a generated placeholder frame and a "Scene N" label, so the
//! job still completes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use adforge_common::error::{AdforgeError, AdforgeResult};
use adforge_layout::Color;
use adforge_scene_model::{
    Dimensions, Element, ElementKind, Geometry, MediaKind, Scene, TextAlign, TextStyle,
    DEFAULT_FONT_FAMILY, DEFAULT_TEXT_COLOR,
};
use futures::future::join_all;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::fetch::Downloader;

const PLACEHOLDER_FILL: Color = Color::rgb(28, 32, 44);
const PLACEHOLDER_FRAME: Color = Color::rgb(70, 78, 98);

/// A scene with its media on local disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedScene {
    /// Position in play order.
    pub index: usize,
    /// The scene's declared `order`.
    pub order: i64,
    pub local_path: PathBuf,
    pub is_video: bool,
    pub duration: f64,
    /// Overlay elements in paint order.
    pub elements: Vec<Element>,
    /// The media is a generated placeholder.
    pub placeholder: bool,
}

/// Fetches scene media.
pub struct AssetProcessor {
    downloader: Arc<Downloader>,
}

impl AssetProcessor {
    pub fn new(downloader: Arc<Downloader>) -> Self {
        Self { downloader }
    }

    /// Process `scenes` (already in play order) concurrently into
    /// `work_dir`. Results keep the input order. Only a failure to write
    /// a placeholder frame is an error.
    pub async fn process(
        &self,
        scenes: &[&Scene],
        work_dir: &Path,
        dimensions: Dimensions,
    ) -> AdforgeResult<Vec<ProcessedScene>> {
        tokio::fs::create_dir_all(work_dir).await?;
        let jobs = scenes
            .iter()
            .enumerate()
            .map(|(index, scene)| self.process_scene(index, scene, work_dir, dimensions));
        join_all(jobs).await.into_iter().collect()
    }

    async fn process_scene(
        &self,
        index: usize,
        scene: &Scene,
        work_dir: &Path,
        dimensions: Dimensions,
    ) -> AdforgeResult<ProcessedScene> {
        let (mut elements, rejected) = scene.elements_in_paint_order();
        for err in rejected {
            tracing::warn!(scene = index, error = %err, "Skipping element");
        }

        let stem = format!("scene-{index:03}");
        let mut media = None;

        if scene.use_animated_version() {
            if let Some(clip) = scene.clip_url.as_deref() {
                match self
                    .downloader
                    .download_to(clip, work_dir, &format!("{stem}-clip"), "mp4")
                    .await
                {
                    Ok(path) => media = Some((path, true)),
                    Err(err) => tracing::warn!(
                        scene = index,
                        error = %err,
                        "Animated clip unavailable, falling back to still image"
                    ),
                }
            }
        }

        if media.is_none() {
            match scene.background_url.as_deref().map(str::trim) {
                Some(url) if !url.is_empty() => {
                    match self.downloader.download_to(url, work_dir, &stem, "png").await {
                        Ok(path) => {
                            let is_video = MediaKind::from_path(&path) == MediaKind::Video;
                            media = Some((path, is_video));
                        }
                        Err(err) => tracing::warn!(
                            scene = index,
                            error = %err,
                            "Scene image unavailable, using placeholder"
                        ),
                    }
                }
                _ => tracing::warn!(scene = index, "Scene has no image, using placeholder"),
            }
        }

        let placeholder = media.is_none();
        let (local_path, is_video) = match media {
            Some(found) => found,
            None => {
                let path = work_dir.join(format!("{stem}-placeholder.png"));
                write_placeholder_frame(&path, dimensions)?;
                elements.push(placeholder_label(index));
                (path, false)
            }
        };

        tracing::debug!(
            scene = index,
            path = %local_path.display(),
            is_video,
            placeholder,
            elements = elements.len(),
            "Scene assets ready"
        );

        Ok(ProcessedScene {
            index,
            order: scene.order,
            local_path,
            is_video,
            duration: scene.duration,
            elements,
            placeholder,
        })
    }
}

/// Solid frame with a thin inset border.
pub fn write_placeholder_frame(path: &Path, dimensions: Dimensions) -> AdforgeResult<()> {
    let rgb = |c: Color| Rgb([c.r, c.g, c.b]);
    let mut frame = RgbImage::from_pixel(dimensions.width, dimensions.height, rgb(PLACEHOLDER_FILL));

    let inset = (dimensions.short_edge() / 24).max(1);
    if dimensions.width > inset * 2 && dimensions.height > inset * 2 {
        let rect = Rect::at(inset as i32, inset as i32)
            .of_size(dimensions.width - inset * 2, dimensions.height - inset * 2);
        draw_hollow_rect_mut(&mut frame, rect, rgb(PLACEHOLDER_FRAME));
    }

    frame
        .save(path)
        .map_err(|e| AdforgeError::Other(anyhow::anyhow!("cannot write placeholder {}: {e}", path.display())))
}

/// "Scene N", painted above every other element.
fn placeholder_label(index: usize) -> Element {
    Element {
        id: format!("placeholder-label-{index}"),
        geometry: Geometry::new(10.0, 45.0, 80.0, 10.0),
        rotation: 0.0,
        opacity: 1.0,
        z_index: i32::MAX,
        kind: ElementKind::Text(TextStyle {
            text: format!("Scene {}", index + 1),
            font_size: Some(56.0),
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            font_weight: 700,
            color: DEFAULT_TEXT_COLOR.to_string(),
            align: TextAlign::Center,
            italic: false,
            underline: false,
            strikethrough: false,
            background: None,
            line_height: 1.2,
            shadow: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use adforge_scene_model::AnimationStatus;
    use serde_json::json;

    use super::*;
    use crate::fetch::testing::{downloader, FakeHttp};

    fn scene(value: serde_json::Value) -> Scene {
        serde_json::from_value(value).unwrap()
    }

    fn processor(http: Arc<FakeHttp>, attempts: u32) -> AssetProcessor {
        AssetProcessor::new(Arc::new(downloader(http, attempts)))
    }

    const DIMS: Dimensions = Dimensions::new(64, 112);

    #[tokio::test]
    async fn test_animated_clip_preferred() {
        let http = Arc::new(FakeHttp::new());
        http.respond("https://cdn.example/c.mp4", Ok(b"clip".to_vec()));
        let s = scene(json!({
            "duration": 4.0,
            "backgroundUrl": "https://cdn.example/i.png",
            "clipUrl": "https://cdn.example/c.mp4",
            "animate": true,
            "animationStatus": "completed"
        }));
        let dir = tempfile::tempdir().unwrap();

        let out = processor(http.clone(), 1).process(&[&s], dir.path(), DIMS).await.unwrap();

        assert!(out[0].is_video);
        assert_eq!(out[0].local_path.file_name().unwrap(), "scene-000-clip.mp4");
        assert_eq!(http.request_count("https://cdn.example/i.png"), 0);
    }

    #[tokio::test]
    async fn test_clip_failure_falls_back_to_image() {
        let http = Arc::new(FakeHttp::new());
        http.respond("https://cdn.example/c.mp4", Err(404));
        http.respond("https://cdn.example/i.png", Ok(b"png".to_vec()));
        let s = scene(json!({
            "duration": 2.0,
            "backgroundUrl": "https://cdn.example/i.png",
            "clipUrl": "https://cdn.example/c.mp4",
            "animate": true
        }));
        let dir = tempfile::tempdir().unwrap();

        let out = processor(http, 2).process(&[&s], dir.path(), DIMS).await.unwrap();

        assert!(!out[0].is_video);
        assert!(!out[0].placeholder);
        assert_eq!(std::fs::read(&out[0].local_path).unwrap(), b"png");
    }

    #[tokio::test]
    async fn test_disabled_animation_never_fetches_clip() {
        let http = Arc::new(FakeHttp::new());
        http.respond("https://cdn.example/i.png", Ok(b"png".to_vec()));
        let s = scene(json!({
            "duration": 2.0,
            "backgroundUrl": "https://cdn.example/i.png",
            "clipUrl": "https://cdn.example/c.mp4",
            "animate": true,
            "animationStatus": "none"
        }));
        assert_eq!(s.animation_status, AnimationStatus::Disabled);
        let dir = tempfile::tempdir().unwrap();

        processor(http.clone(), 1).process(&[&s], dir.path(), DIMS).await.unwrap();

        assert_eq!(http.request_count("https://cdn.example/c.mp4"), 0);
    }

    #[tokio::test]
    async fn test_unreachable_media_yields_placeholder_and_label() {
        let http = Arc::new(FakeHttp::new());
        let first = scene(json!({"duration": 1.0, "backgroundUrl": "https://cdn.example/ok.png"}));
        let second = scene(json!({"duration": 1.5, "backgroundUrl": "https://cdn.example/gone.png"}));
        http.respond("https://cdn.example/ok.png", Ok(b"png".to_vec()));
        http.respond("https://cdn.example/gone.png", Err(500));
        let dir = tempfile::tempdir().unwrap();

        let out = processor(http, 2)
            .process(&[&first, &second], dir.path(), DIMS)
            .await
            .unwrap();

        assert_eq!(out.iter().map(|s| s.index).collect::<Vec<_>>(), vec![0, 1]);
        assert!(!out[0].placeholder);
        let placeholder = &out[1];
        assert!(placeholder.placeholder);
        assert_eq!(placeholder.duration, 1.5);
        let frame = image::open(&placeholder.local_path).unwrap();
        assert_eq!((frame.width(), frame.height()), (64, 112));
        match &placeholder.elements.last().unwrap().kind {
            ElementKind::Text(style) => assert_eq!(style.text, "Scene 2"),
            other => panic!("expected label, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_third_attempt_asset_is_used() {
        let http = Arc::new(FakeHttp::new());
        let url = "https://cdn.example/flaky.jpg";
        http.respond(url, Err(503));
        http.respond(url, Err(503));
        http.respond(url, Ok(b"jpeg".to_vec()));
        let s = scene(json!({"duration": 3.0, "backgroundUrl": url}));
        let dir = tempfile::tempdir().unwrap();

        let out = processor(http.clone(), 3).process(&[&s], dir.path(), DIMS).await.unwrap();

        assert!(!out[0].placeholder);
        assert_eq!(out[0].local_path.file_name().unwrap(), "scene-000.jpg");
        assert_eq!(std::fs::read(&out[0].local_path).unwrap(), b"jpeg");
        assert_eq!(http.request_count(url), 3);
    }

    #[tokio::test]
    async fn test_elements_sorted_and_unknown_skipped() {
        let http = Arc::new(FakeHttp::new());
        http.respond("https://cdn.example/i.png", Ok(b"png".to_vec()));
        let s = scene(json!({
            "duration": 2.0,
            "backgroundUrl": "https://cdn.example/i.png",
            "elements": [
                {"id": "top", "type": "shape", "x": 0, "y": 0, "width": 10, "height": 10, "zIndex": 5},
                {"id": "odd", "type": "sparkles", "x": 0, "y": 0, "width": 10, "height": 10},
                {"id": "bottom", "type": "text", "x": 0, "y": 0, "width": 10, "height": 10, "zIndex": 1, "content": "Hi"}
            ]
        }));
        let dir = tempfile::tempdir().unwrap();

        let out = processor(http, 1).process(&[&s], dir.path(), DIMS).await.unwrap();

        let ids: Vec<_> = out[0].elements.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["bottom", "top"]);
    }
}
