//! ffmpeg-backed rendering: per-scene filter passes and the final encode.
//!
//! The final encode tries strategies in order until one succeeds:
//!
//! | frame list   | strategies                                             |
//! |--------------|--------------------------------------------------------|
//! | homogeneous  | DurationControl → ComplexFilter → MixedContentFallback |
//! | mixed        | MixedContentFallback → ComplexFilter                   |
//!
//! Stills and clips are never concatenated directly by the demuxer; mixed
//! lists are normalized to matching H.264 clips first.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use adforge_common::config::EncoderSettings;
use adforge_common::error::{AdforgeError, AdforgeResult};
use adforge_common::{sanitize_component, JobWorkspace};
use adforge_scene_model::{Dimensions, EncodingProfile, FrameList, FrameListEntry, MediaKind};
use futures::future::join_all;
use serde::Deserialize;

use crate::assets::ProcessedScene;
use crate::compositor::{compose_scene, CompositeStep, ResolvedOverlay};
use crate::elements::{FilterFragment, PendingOverlay};
use crate::fetch::{reference_digest, Downloader};
use crate::filter::{FilterChain, FilterGraph, FilterNode};
use crate::runner::{CommandOutput, CommandRunner};

/// How the final video is assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeStrategy {
    /// Concat demuxer manifest with per-entry durations.
    DurationControl,
    /// One input per entry joined by the `concat` filter.
    ComplexFilter,
    /// Normalize every entry to a clip, then [`EncodeStrategy::DurationControl`].
    MixedContentFallback,
}

impl EncodeStrategy {
    /// Strategies to try for `frames`, in order.
    pub fn plan(frames: &FrameList) -> Vec<EncodeStrategy> {
        if frames.is_mixed() {
            vec![Self::MixedContentFallback, Self::ComplexFilter]
        } else {
            vec![Self::DurationControl, Self::ComplexFilter, Self::MixedContentFallback]
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DurationControl => "duration-control",
            Self::ComplexFilter => "complex-filter",
            Self::MixedContentFallback => "mixed-content-fallback",
        }
    }
}

impl std::fmt::Display for EncodeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoder progress for the running final pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodeTick {
    /// Fraction of the expected output written, `0.0..=1.0`.
    pub fraction: f64,
    pub eta_secs: f64,
}

/// What the final pass did, for the job's debug report.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalRender {
    pub output: PathBuf,
    pub strategy: EncodeStrategy,
    pub ffmpeg_args: Vec<String>,
    /// Strategies that failed before the successful one, with their errors.
    pub failures: Vec<(EncodeStrategy, String)>,
}

/// What ffprobe saw in the output. Mismatches are logged, never fatal.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSummary {
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    pub codec: String,
}

/// Ordered (media, duration) pairs for the final encode.
pub fn build_frame_list<I>(entries: I) -> FrameList
where
    I: IntoIterator<Item = (PathBuf, f64)>,
{
    let mut frames = FrameList::new();
    for (path, duration) in entries {
        frames.push(path, duration);
    }
    frames
}

/// Concat demuxer manifest: one `file`/`duration` pair per entry. The
/// last entry is not repeated; output length is capped with `-t` instead.
pub fn concat_manifest(entries: &[FrameListEntry]) -> String {
    let mut manifest = String::from("ffconcat version 1.0\n");
    for entry in entries {
        let path = entry.file_path.display().to_string().replace('\'', "'\\''");
        manifest.push_str(&format!("file '{path}'\nduration {:.3}\n", entry.duration));
    }
    manifest
}

/// `scale,crop,pad,setsar,fps,format` to the canvas. Fits the same way as
/// [`cover_nodes`], so scenes that skipped or failed their own filter pass
/// match the ones that ran it; `pad` only absorbs rounding.
fn normalize_nodes(dims: Dimensions, fps: u32) -> Vec<FilterNode> {
    vec![
        FilterNode::scale(dims.width, dims.height).arg("force_original_aspect_ratio", "increase"),
        FilterNode::new("crop").arg("w", dims.width).arg("h", dims.height),
        FilterNode::new("pad")
            .arg("w", dims.width)
            .arg("h", dims.height)
            .arg("x", "(ow-iw)/2")
            .arg("y", "(oh-ih)/2")
            .arg("color", "black"),
        FilterNode::setsar(),
        FilterNode::fps(fps),
        FilterNode::format("yuv420p"),
    ]
}

/// Fill the canvas, cropping overflow. Used for scene media before
/// elements are drawn in canvas coordinates.
fn cover_nodes(dims: Dimensions) -> Vec<FilterNode> {
    vec![
        FilterNode::scale(dims.width, dims.height).arg("force_original_aspect_ratio", "increase"),
        FilterNode::new("crop").arg("w", dims.width).arg("h", dims.height),
        FilterNode::setsar(),
    ]
}

/// Hold the last frame long enough, then cut to exactly `secs`.
fn fit_duration_nodes(secs: f64) -> Vec<FilterNode> {
    vec![
        FilterNode::setpts_zero(),
        FilterNode::tpad_clone(secs),
        FilterNode::trim(secs),
        FilterNode::setpts_zero(),
    ]
}

fn bt709_params() -> FilterNode {
    FilterNode::new("setparams")
        .arg("color_primaries", "bt709")
        .arg("color_trc", "bt709")
        .arg("colorspace", "bt709")
}

fn base_args() -> Vec<String> {
    ["-y", "-hide_banner", "-loglevel", "error", "-nostats"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn push_all(args: &mut Vec<String>, items: &[&str]) {
    args.extend(items.iter().map(|s| s.to_string()));
}

/// H.264 output settings for `profile`. Output carries no audio.
pub fn codec_args(preset: &str, profile: EncodingProfile) -> Vec<String> {
    vec![
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        preset.to_string(),
        "-profile:v".to_string(),
        "high".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-b:v".to_string(),
        format!("{}k", profile.video_bitrate_kbps),
        "-maxrate".to_string(),
        format!("{}k", profile.max_bitrate_kbps()),
        "-bufsize".to_string(),
        format!("{}k", profile.buffer_size_kbps()),
        "-movflags".to_string(),
        "+faststart".to_string(),
        "-an".to_string(),
    ]
}

fn color_tag_args() -> Vec<String> {
    ["-color_primaries", "bt709", "-color_trc", "bt709", "-colorspace", "bt709"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Runs ffmpeg/ffprobe for one job.
pub struct FfmpegRenderer {
    runner: Arc<dyn CommandRunner>,
    downloader: Arc<Downloader>,
    encoder: EncoderSettings,
}

impl FfmpegRenderer {
    pub fn new(runner: Arc<dyn CommandRunner>, downloader: Arc<Downloader>, encoder: EncoderSettings) -> Self {
        Self {
            runner,
            downloader,
            encoder,
        }
    }

    async fn ffmpeg(&self, args: &[String]) -> AdforgeResult<CommandOutput> {
        tracing::debug!(args = ?args, "Running ffmpeg");
        self.runner.run(&self.encoder.ffmpeg, args).await
    }

    /// Download each pending overlay, trying its candidates in order. An
    /// overlay nothing can be fetched for becomes a placeholder box.
    async fn resolve_steps(
        &self,
        scene: usize,
        fragments: &[FilterFragment],
        overlays_dir: &Path,
    ) -> Vec<CompositeStep> {
        join_all(fragments.iter().map(|fragment| async move {
            match fragment {
                FilterFragment::Draw(node) => CompositeStep::Draw(node.clone()),
                FilterFragment::Overlay(pending) => match self.fetch_overlay(scene, pending, overlays_dir).await {
                    Some(path) => CompositeStep::Overlay(ResolvedOverlay {
                        path,
                        rect: pending.rect,
                        opacity: pending.opacity,
                    }),
                    None => CompositeStep::Draw(pending.placeholder()),
                },
            }
        }))
        .await
    }

    async fn fetch_overlay(&self, scene: usize, pending: &PendingOverlay, dir: &Path) -> Option<PathBuf> {
        for candidate in &pending.candidates {
            let stem = format!(
                "scene-{scene:03}-{}-{}",
                sanitize_component(&pending.element_id),
                reference_digest(candidate)
            );
            match self.downloader.download_to(candidate, dir, &stem, "png").await {
                Ok(path) => return Some(path),
                Err(err) => tracing::warn!(
                    scene,
                    element = %pending.element_id,
                    error = %err,
                    "Overlay candidate failed"
                ),
            }
        }
        tracing::warn!(
            scene,
            element = %pending.element_id,
            candidates = pending.candidates.len(),
            "No overlay image available, drawing placeholder"
        );
        None
    }

    /// Draw `fragments` onto a still scene. Returns the filtered PNG, the
    /// untouched source when there is nothing to draw, or a copy of the
    /// source when filtering fails.
    pub async fn apply_image_filters(
        &self,
        scene: &ProcessedScene,
        fragments: &[FilterFragment],
        dims: Dimensions,
        workspace: &JobWorkspace,
    ) -> PathBuf {
        if fragments.is_empty() {
            return scene.local_path.clone();
        }
        let steps = self.resolve_steps(scene.index, fragments, &workspace.overlays_dir()).await;
        let composition = compose_scene(cover_nodes(dims), &steps, vec![FilterNode::format("rgb24")]);
        let output = workspace.scenes_dir().join(format!("scene-{:03}.png", scene.index));

        let mut args = base_args();
        args.push("-i".to_string());
        args.push(scene.local_path.display().to_string());
        for overlay in &composition.overlay_inputs {
            args.push("-i".to_string());
            args.push(overlay.display().to_string());
        }
        args.push("-filter_complex".to_string());
        args.push(composition.graph.to_string());
        args.push("-map".to_string());
        args.push(format!("[{}]", composition.output_label()));
        push_all(&mut args, &["-frames:v", "1", "-update", "1"]);
        args.push(output.display().to_string());

        self.filtered_or_copy(scene, &args, output, workspace).await
    }

    /// Draw `fragments` onto a clip and fit it to the scene duration,
    /// holding the last frame of short clips. Falls back to a copy of the
    /// source on failure.
    pub async fn apply_video_filters(
        &self,
        scene: &ProcessedScene,
        fragments: &[FilterFragment],
        dims: Dimensions,
        profile: EncodingProfile,
        workspace: &JobWorkspace,
    ) -> PathBuf {
        let steps = self.resolve_steps(scene.index, fragments, &workspace.overlays_dir()).await;
        let mut base = cover_nodes(dims);
        base.push(FilterNode::fps(profile.fps));
        base.extend(fit_duration_nodes(scene.duration));
        let composition = compose_scene(base, &steps, vec![FilterNode::format("yuv420p")]);
        let output = workspace.scenes_dir().join(format!("scene-{:03}.mp4", scene.index));

        let mut args = base_args();
        args.push("-i".to_string());
        args.push(scene.local_path.display().to_string());
        for overlay in &composition.overlay_inputs {
            args.push("-i".to_string());
            args.push(overlay.display().to_string());
        }
        args.push("-filter_complex".to_string());
        args.push(composition.graph.to_string());
        args.push("-map".to_string());
        args.push(format!("[{}]", composition.output_label()));
        args.push("-t".to_string());
        args.push(format!("{:.3}", scene.duration));
        args.extend(codec_args(&self.encoder.preset, profile));
        args.push(output.display().to_string());

        self.filtered_or_copy(scene, &args, output, workspace).await
    }

    async fn filtered_or_copy(
        &self,
        scene: &ProcessedScene,
        args: &[String],
        output: PathBuf,
        workspace: &JobWorkspace,
    ) -> PathBuf {
        let err = match self.ffmpeg(args).await {
            Ok(out) if out.success && output.is_file() => return output,
            Ok(out) => AdforgeError::filter_application(scene.index, out.stderr_tail(5)),
            Err(err) => AdforgeError::filter_application(scene.index, err.to_string()),
        };
        tracing::warn!(scene = scene.index, error = %err, "Scene filters failed, using unfiltered media");

        let ext = scene
            .local_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin");
        let copy = workspace
            .scenes_dir()
            .join(format!("scene-{:03}-unfiltered.{ext}", scene.index));
        match tokio::fs::copy(&scene.local_path, &copy).await {
            Ok(_) => copy,
            Err(copy_err) => {
                tracing::warn!(scene = scene.index, error = %copy_err, "Cannot copy scene media, using original");
                scene.local_path.clone()
            }
        }
    }

    /// Encode `frames` into `output`, trying each planned strategy until
    /// one succeeds. Exhausting them is a [`AdforgeError::FatalJob`].
    pub async fn render_final(
        &self,
        frames: &FrameList,
        output: &Path,
        dims: Dimensions,
        profile: EncodingProfile,
        workspace: &JobWorkspace,
        on_tick: &(dyn Fn(EncodeTick) + Send + Sync),
    ) -> AdforgeResult<FinalRender> {
        if frames.is_empty() {
            return Err(AdforgeError::fatal("frame list is empty"));
        }
        let plan = EncodeStrategy::plan(frames);
        tracing::info!(
            entries = frames.len(),
            mixed = frames.is_mixed(),
            total_secs = frames.total_duration(),
            plan = ?plan.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            "Starting final encode"
        );

        let mut failures = Vec::new();
        for strategy in plan {
            let started = Instant::now();
            match self.run_strategy(strategy, frames, output, dims, profile, workspace, on_tick).await {
                Ok(args) => {
                    tracing::info!(
                        strategy = strategy.as_str(),
                        elapsed_secs = started.elapsed().as_secs_f64(),
                        "Final encode finished"
                    );
                    return Ok(FinalRender {
                        output: output.to_path_buf(),
                        strategy,
                        ffmpeg_args: args,
                        failures,
                    });
                }
                Err(err) => {
                    tracing::warn!(strategy = strategy.as_str(), error = %err, "Encode strategy failed");
                    if output.exists() {
                        let _ = tokio::fs::remove_file(output).await;
                    }
                    failures.push((strategy, err.to_string()));
                }
            }
        }

        let summary = failures
            .iter()
            .map(|(s, e)| format!("{s}: {e}"))
            .collect::<Vec<_>>()
            .join("; ");
        Err(AdforgeError::fatal(format!("all encode strategies failed ({summary})")))
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_strategy(
        &self,
        strategy: EncodeStrategy,
        frames: &FrameList,
        output: &Path,
        dims: Dimensions,
        profile: EncodingProfile,
        workspace: &JobWorkspace,
        on_tick: &(dyn Fn(EncodeTick) + Send + Sync),
    ) -> AdforgeResult<Vec<String>> {
        let args = match strategy {
            EncodeStrategy::DurationControl => {
                self.duration_control_args(frames, output, dims, profile, workspace).await?
            }
            EncodeStrategy::ComplexFilter => self.complex_filter_args(frames, output, dims, profile),
            EncodeStrategy::MixedContentFallback => {
                let normalized = self.normalize_all(frames, dims, profile, workspace).await?;
                self.duration_control_args(&normalized, output, dims, profile, workspace).await?
            }
        };

        let out = self.encode_with_progress(&args, frames.total_duration(), on_tick).await?;
        if !out.success {
            return Err(AdforgeError::encode_strategy(strategy.as_str(), out.stderr_tail(8)));
        }
        if !output.is_file() {
            return Err(AdforgeError::encode_strategy(strategy.as_str(), "encoder produced no output"));
        }
        Ok(args)
    }

    async fn duration_control_args(
        &self,
        frames: &FrameList,
        output: &Path,
        dims: Dimensions,
        profile: EncodingProfile,
        workspace: &JobWorkspace,
    ) -> AdforgeResult<Vec<String>> {
        let manifest = workspace.root().join("concat.txt");
        tokio::fs::write(&manifest, concat_manifest(frames.entries())).await?;

        let chain = FilterChain::new().nodes(normalize_nodes(dims, profile.fps));
        let mut args = base_args();
        push_all(&mut args, &["-progress", "pipe:1", "-f", "concat", "-safe", "0", "-i"]);
        args.push(manifest.display().to_string());
        args.push("-vf".to_string());
        args.push(chain.to_string());
        args.push("-t".to_string());
        args.push(format!("{:.3}", frames.total_duration()));
        args.extend(codec_args(&self.encoder.preset, profile));
        args.push(output.display().to_string());
        Ok(args)
    }

    fn complex_filter_args(
        &self,
        frames: &FrameList,
        output: &Path,
        dims: Dimensions,
        profile: EncodingProfile,
    ) -> Vec<String> {
        let mut args = base_args();
        push_all(&mut args, &["-progress", "pipe:1"]);
        let mut graph = FilterGraph::new();
        let mut joined = FilterChain::new();

        for (i, entry) in frames.entries().iter().enumerate() {
            if entry.media_kind() != MediaKind::Video {
                push_all(&mut args, &["-loop", "1", "-t"]);
                args.push(format!("{:.3}", entry.duration));
            }
            args.push("-i".to_string());
            args.push(entry.file_path.display().to_string());

            let label = format!("v{i}");
            graph.push(
                FilterChain::new()
                    .input(format!("{i}:v"))
                    .nodes(normalize_nodes(dims, profile.fps))
                    .nodes(fit_duration_nodes(entry.duration))
                    .output(label.clone()),
            );
            joined = joined.input(label);
        }
        graph.push(
            joined
                .node(
                    FilterNode::new("concat")
                        .arg("n", frames.len())
                        .arg("v", 1)
                        .arg("a", 0),
                )
                .output("vout"),
        );

        args.push("-filter_complex".to_string());
        args.push(graph.to_string());
        push_all(&mut args, &["-map", "[vout]", "-t"]);
        args.push(format!("{:.3}", frames.total_duration()));
        args.extend(codec_args(&self.encoder.preset, profile));
        args.push(output.display().to_string());
        args
    }

    /// Re-encode every entry to an H.264 clip with matching size, rate,
    /// pixel format, and bt709 colour.
    async fn normalize_all(
        &self,
        frames: &FrameList,
        dims: Dimensions,
        profile: EncodingProfile,
        workspace: &JobWorkspace,
    ) -> AdforgeResult<FrameList> {
        let dir = workspace.normalized_dir();
        tokio::fs::create_dir_all(&dir).await?;
        let mut normalized = FrameList::new();

        for (i, entry) in frames.entries().iter().enumerate() {
            let out = dir.join(format!("norm-{i:03}.mp4"));
            let mut args = base_args();
            if entry.media_kind() != MediaKind::Video {
                push_all(&mut args, &["-loop", "1", "-t"]);
                args.push(format!("{:.3}", entry.duration));
            }
            args.push("-i".to_string());
            args.push(entry.file_path.display().to_string());

            let chain = FilterChain::new()
                .nodes(normalize_nodes(dims, profile.fps))
                .nodes(fit_duration_nodes(entry.duration))
                .node(bt709_params());
            args.push("-vf".to_string());
            args.push(chain.to_string());
            args.push("-t".to_string());
            args.push(format!("{:.3}", entry.duration));
            args.extend(codec_args(&self.encoder.preset, profile));
            args.extend(color_tag_args());
            args.push(out.display().to_string());

            let result = self.ffmpeg(&args).await?;
            if !result.success {
                return Err(AdforgeError::encode_strategy(
                    EncodeStrategy::MixedContentFallback.as_str(),
                    format!("normalizing entry {i}: {}", result.stderr_tail(5)),
                ));
            }
            normalized.push(out, entry.duration);
        }

        tracing::info!(entries = normalized.len(), "Normalized mixed content");
        Ok(normalized)
    }

    async fn encode_with_progress(
        &self,
        args: &[String],
        expected_secs: f64,
        on_tick: &(dyn Fn(EncodeTick) + Send + Sync),
    ) -> AdforgeResult<CommandOutput> {
        tracing::debug!(args = ?args, "Running final ffmpeg pass");
        let started = Instant::now();
        let mut state = ProgressState::default();
        let mut on_line = |line: &str| {
            if let Some((key, value)) = line.trim().split_once('=') {
                state.update(key, value);
                if key == "progress" {
                    on_tick(state.tick(expected_secs, started.elapsed().as_secs_f64()));
                }
            }
        };
        self.runner
            .run_streaming(&self.encoder.ffmpeg, args, &mut on_line)
            .await
    }

    /// Probe `output` and compare it with what was requested. Any mismatch
    /// is a [`AdforgeError::Verification`]; the output itself is left alone.
    pub async fn verify(
        &self,
        output: &Path,
        expected_secs: f64,
        dims: Dimensions,
    ) -> AdforgeResult<ProbeSummary> {
        let args: Vec<String> = [
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "format=duration:stream=codec_name,width,height",
            "-of",
            "json",
        ]
        .iter()
        .map(|s| s.to_string())
        .chain(std::iter::once(output.display().to_string()))
        .collect();

        let out = self
            .runner
            .run(&self.encoder.ffprobe, &args)
            .await
            .map_err(|err| AdforgeError::verification(format!("ffprobe unavailable: {err}")))?;
        if !out.success {
            return Err(AdforgeError::verification(format!(
                "ffprobe failed: {}",
                out.stderr_tail(3)
            )));
        }
        let summary = parse_probe(&out.stdout)
            .ok_or_else(|| AdforgeError::verification("unreadable ffprobe output"))?;

        let mut problems = Vec::new();
        if (summary.duration_secs - expected_secs).abs() > 0.5 {
            problems.push(format!(
                "duration {:.3}s, expected {expected_secs:.3}s",
                summary.duration_secs
            ));
        }
        if (summary.width, summary.height) != (dims.width, dims.height) {
            problems.push(format!(
                "resolution {}x{}, expected {dims}",
                summary.width, summary.height
            ));
        }
        if summary.codec != "h264" {
            problems.push(format!("codec {}, expected h264", summary.codec));
        }
        if !problems.is_empty() {
            return Err(AdforgeError::verification(problems.join("; ")));
        }

        tracing::info!(
            duration_secs = summary.duration_secs,
            width = summary.width,
            height = summary.height,
            codec = %summary.codec,
            "Output verified"
        );
        Ok(summary)
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

fn parse_probe(json: &str) -> Option<ProbeSummary> {
    let probe: ProbeOutput = serde_json::from_str(json).ok()?;
    let stream = probe.streams.into_iter().next()?;
    let duration_secs = probe
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);
    Some(ProbeSummary {
        duration_secs,
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
        codec: stream.codec_name.unwrap_or_default(),
    })
}

#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
    complete: bool,
}

impl ProgressState {
    fn update(&mut self, key: &str, value: &str) {
        match key {
            // Despite the name, out_time_ms is in microseconds.
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }

    fn tick(&self, expected_secs: f64, elapsed_secs: f64) -> EncodeTick {
        let fraction = if self.complete {
            1.0
        } else if expected_secs <= 0.0 {
            0.0
        } else {
            (self.out_time_secs / expected_secs).clamp(0.0, 1.0)
        };
        let eta_secs = if fraction > 0.0 {
            (elapsed_secs / fraction) - elapsed_secs
        } else {
            0.0
        }
        .max(0.0);
        EncodeTick { fraction, eta_secs }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use adforge_scene_model::Quality;

    use super::*;
    use crate::fetch::testing::{downloader, FakeHttp};
    use crate::filter::Thickness;
    use crate::runner::testing::{failed, ok, FakeRunner};
    use adforge_layout::PixelRect;

    const DIMS: Dimensions = Dimensions::new(768, 1344);

    fn renderer(runner: Arc<FakeRunner>, http: Arc<FakeHttp>) -> FfmpegRenderer {
        FfmpegRenderer::new(runner, Arc::new(downloader(http, 1)), EncoderSettings::default())
    }

    fn profile() -> EncodingProfile {
        Quality::Medium.profile()
    }

    fn workspace(root: &Path) -> JobWorkspace {
        JobWorkspace::create(root, "test").unwrap()
    }

    fn scene(path: PathBuf, is_video: bool) -> ProcessedScene {
        ProcessedScene {
            index: 0,
            order: 0,
            local_path: path,
            is_video,
            duration: 2.5,
            elements: Vec::new(),
            placeholder: false,
        }
    }

    fn no_ticks() -> impl Fn(EncodeTick) + Send + Sync {
        |_| {}
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn test_strategy_plan() {
        let homogeneous = build_frame_list(vec![(PathBuf::from("a.png"), 1.0), (PathBuf::from("b.jpg"), 2.0)]);
        assert_eq!(
            EncodeStrategy::plan(&homogeneous),
            vec![
                EncodeStrategy::DurationControl,
                EncodeStrategy::ComplexFilter,
                EncodeStrategy::MixedContentFallback
            ]
        );
        let mixed = build_frame_list(vec![(PathBuf::from("a.png"), 1.0), (PathBuf::from("b.mp4"), 2.0)]);
        assert_eq!(
            EncodeStrategy::plan(&mixed),
            vec![EncodeStrategy::MixedContentFallback, EncodeStrategy::ComplexFilter]
        );
    }

    #[test]
    fn test_frame_list_total_matches_scene_durations() {
        let frames = build_frame_list(vec![
            (PathBuf::from("a.png"), 3.5),
            (PathBuf::from("b.png"), 4.0),
            (PathBuf::from("c.png"), 1.25),
        ]);
        assert!((frames.total_duration() - 8.75).abs() < 0.01);
    }

    #[test]
    fn test_manifest_has_no_duplicate_trailing_entry() {
        let frames = build_frame_list(vec![
            (PathBuf::from("/w/a.png"), 3.5),
            (PathBuf::from("/w/it's.png"), 4.0),
        ]);
        let manifest = concat_manifest(frames.entries());
        assert_eq!(
            manifest,
            "ffconcat version 1.0\nfile '/w/a.png'\nduration 3.500\nfile '/w/it'\\''s.png'\nduration 4.000\n"
        );
        assert_eq!(manifest.matches("file ").count(), 2);
    }

    #[test]
    fn test_codec_args() {
        let args = codec_args("medium", profile());
        assert!(has_pair(&args, "-c:v", "libx264"));
        assert!(has_pair(&args, "-profile:v", "high"));
        assert!(has_pair(&args, "-pix_fmt", "yuv420p"));
        assert!(has_pair(&args, "-b:v", "5000k"));
        assert!(has_pair(&args, "-maxrate", "7500k"));
        assert!(has_pair(&args, "-bufsize", "10000k"));
        assert!(has_pair(&args, "-movflags", "+faststart"));
        assert_eq!(args.last().map(String::as_str), Some("-an"));
    }

    #[tokio::test]
    async fn test_homogeneous_uses_duration_control() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace(root.path());
        let runner = Arc::new(FakeRunner::succeeding());
        let r = renderer(runner.clone(), Arc::new(FakeHttp::new()));
        let frames = build_frame_list(vec![(PathBuf::from("a.png"), 2.0), (PathBuf::from("b.png"), 3.0)]);
        let output = root.path().join("out.mp4");

        let result = r
            .render_final(&frames, &output, DIMS, profile(), &ws, &no_ticks())
            .await
            .unwrap();

        assert_eq!(result.strategy, EncodeStrategy::DurationControl);
        assert!(result.failures.is_empty());
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert!(has_pair(&calls[0].1, "-f", "concat"));
        assert!(has_pair(&calls[0].1, "-t", "5.000"));
        assert!(ws.root().join("concat.txt").is_file());
    }

    #[tokio::test]
    async fn test_strategy_failure_moves_to_next() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace(root.path());
        let runner = Arc::new(FakeRunner::new(|_, args: &[String]| {
            if args.iter().any(|a| a == "concat") {
                return failed("Invalid data found when processing input");
            }
            if let Some(out) = args.last() {
                std::fs::write(out, b"mp4").unwrap();
            }
            ok("")
        }));
        let r = renderer(runner.clone(), Arc::new(FakeHttp::new()));
        let frames = build_frame_list(vec![(PathBuf::from("a.png"), 2.0), (PathBuf::from("b.png"), 3.0)]);
        let output = root.path().join("out.mp4");

        let result = r
            .render_final(&frames, &output, DIMS, profile(), &ws, &no_ticks())
            .await
            .unwrap();

        assert_eq!(result.strategy, EncodeStrategy::ComplexFilter);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].0, EncodeStrategy::DurationControl);
        let last = &runner.calls()[1].1;
        assert!(has_pair(last, "-loop", "1"));
        assert!(last.iter().any(|a| a.contains("concat=n=2:v=1:a=0[vout]")));
    }

    #[tokio::test]
    async fn test_mixed_content_is_normalized_first() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace(root.path());
        let runner = Arc::new(FakeRunner::succeeding());
        let r = renderer(runner.clone(), Arc::new(FakeHttp::new()));
        let frames = build_frame_list(vec![(PathBuf::from("still.png"), 2.0), (PathBuf::from("clip.mp4"), 3.0)]);
        let output = root.path().join("out.mp4");

        let result = r
            .render_final(&frames, &output, DIMS, profile(), &ws, &no_ticks())
            .await
            .unwrap();

        assert_eq!(result.strategy, EncodeStrategy::MixedContentFallback);
        let calls = runner.calls();
        assert_eq!(calls.len(), 3);
        for (_, args) in &calls[..2] {
            assert!(args.last().unwrap().contains("norm-"));
            assert!(has_pair(args, "-colorspace", "bt709"));
        }
        let manifest = std::fs::read_to_string(ws.root().join("concat.txt")).unwrap();
        assert!(!manifest.contains("still.png"));
        assert!(manifest.contains("norm-000.mp4") && manifest.contains("norm-001.mp4"));
    }

    #[tokio::test]
    async fn test_exhausted_strategies_are_fatal() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace(root.path());
        let runner = Arc::new(FakeRunner::new(|_, _| failed("boom")));
        let r = renderer(runner.clone(), Arc::new(FakeHttp::new()));
        let frames = build_frame_list(vec![(PathBuf::from("a.png"), 2.0)]);

        let err = r
            .render_final(&frames, &root.path().join("o.mp4"), DIMS, profile(), &ws, &no_ticks())
            .await
            .unwrap_err();

        assert!(err.is_fatal());
        let msg = err.to_string();
        assert!(msg.contains("duration-control") && msg.contains("complex-filter"));
    }

    #[tokio::test]
    async fn test_progress_ticks_reported() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace(root.path());
        let runner = Arc::new(FakeRunner::new(|_, args: &[String]| {
            std::fs::write(args.last().unwrap(), b"mp4").unwrap();
            ok("frame=10\nout_time_us=2000000\nprogress=continue\nout_time_us=4000000\nprogress=end\n")
        }));
        let r = renderer(runner, Arc::new(FakeHttp::new()));
        let frames = build_frame_list(vec![(PathBuf::from("a.png"), 4.0)]);
        let ticks = Mutex::new(Vec::new());
        let record = |tick: EncodeTick| ticks.lock().unwrap().push(tick.fraction);

        r.render_final(&frames, &root.path().join("o.mp4"), DIMS, profile(), &ws, &record)
            .await
            .unwrap();

        assert_eq!(*ticks.lock().unwrap(), vec![0.5, 1.0]);
    }

    #[tokio::test]
    async fn test_image_filters_compose_draws_and_overlays() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace(root.path());
        let src = root.path().join("bg.png");
        std::fs::write(&src, b"png").unwrap();
        let http = Arc::new(FakeHttp::new());
        http.respond("https://cdn.example/logo.png", Ok(b"logo".to_vec()));
        let runner = Arc::new(FakeRunner::succeeding());
        let r = renderer(runner.clone(), http);

        let fragments = vec![
            FilterFragment::Draw(FilterNode::drawbox(0, 0, 10, 10, "#FFFFFF", Thickness::Fill)),
            FilterFragment::Overlay(PendingOverlay {
                element_id: "logo".to_string(),
                rect: PixelRect::new(10, 10, 100, 50),
                opacity: 1.0,
                candidates: vec!["https://cdn.example/logo.png".to_string()],
                label: None,
            }),
        ];
        let out = r.apply_image_filters(&scene(src, false), &fragments, DIMS, &ws).await;

        assert_eq!(out, ws.scenes_dir().join("scene-000.png"));
        let args = &runner.calls()[0].1;
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 2);
        let graph = args.iter().find(|a| a.contains("[vout]")).unwrap();
        assert!(graph.contains("drawbox") && graph.contains("overlay=x=10:y=10"));
    }

    #[tokio::test]
    async fn test_unreachable_overlay_becomes_placeholder_box() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace(root.path());
        let src = root.path().join("bg.png");
        std::fs::write(&src, b"png").unwrap();
        let http = Arc::new(FakeHttp::new());
        http.respond("https://cdn.example/a.png", Err(404));
        http.respond("https://cdn.example/b.png", Err(500));
        let runner = Arc::new(FakeRunner::succeeding());
        let r = renderer(runner.clone(), http.clone());

        let fragments = vec![FilterFragment::Overlay(PendingOverlay {
            element_id: "logo".to_string(),
            rect: PixelRect::new(1, 2, 30, 40),
            opacity: 1.0,
            candidates: vec!["https://cdn.example/a.png".to_string(), "https://cdn.example/b.png".to_string()],
            label: None,
        })];
        r.apply_image_filters(&scene(src, false), &fragments, DIMS, &ws).await;

        assert_eq!(http.request_count("https://cdn.example/"), 2);
        let args = &runner.calls()[0].1;
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 1);
        let graph = args.iter().find(|a| a.contains("[vout]")).unwrap();
        assert!(graph.contains("drawbox=x=1:y=2:w=30:h=40:color=#808080"));
    }

    #[tokio::test]
    async fn test_filter_failure_copies_source() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace(root.path());
        let src = root.path().join("clip.mp4");
        std::fs::write(&src, b"clip").unwrap();
        let runner = Arc::new(FakeRunner::new(|_, _| failed("No such filter")));
        let r = renderer(runner, Arc::new(FakeHttp::new()));

        let out = r
            .apply_video_filters(&scene(src, true), &[], DIMS, profile(), &ws)
            .await;

        assert_eq!(out, ws.scenes_dir().join("scene-000-unfiltered.mp4"));
        assert_eq!(std::fs::read(out).unwrap(), b"clip");
    }

    #[tokio::test]
    async fn test_video_filters_pad_and_trim() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace(root.path());
        let src = root.path().join("clip.mp4");
        std::fs::write(&src, b"clip").unwrap();
        let runner = Arc::new(FakeRunner::succeeding());
        let r = renderer(runner.clone(), Arc::new(FakeHttp::new()));

        r.apply_video_filters(&scene(src, true), &[], DIMS, profile(), &ws).await;

        let args = &runner.calls()[0].1;
        let graph = args.iter().find(|a| a.contains("[vout]")).unwrap();
        assert!(graph.contains("tpad=stop_mode=clone:stop_duration=2.500"));
        assert!(graph.contains("trim=duration=2.500"));
        assert!(args.iter().any(|a| a == "-an"));
    }

    #[test]
    fn test_scene_and_final_passes_share_fit() {
        let fit = |nodes: &[FilterNode]| -> Vec<String> {
            nodes
                .iter()
                .filter(|n| matches!(n.name(), "scale" | "crop"))
                .map(FilterNode::to_filter_string)
                .collect()
        };
        let scene_fit = fit(&cover_nodes(DIMS));
        let final_fit = fit(&normalize_nodes(DIMS, 30));
        assert_eq!(scene_fit, final_fit);
        assert!(scene_fit[0].contains("force_original_aspect_ratio=increase"));
    }

    #[tokio::test]
    async fn test_untouched_image_is_cropped_in_final_pass() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace(root.path());
        let runner = Arc::new(FakeRunner::succeeding());
        let r = renderer(runner.clone(), Arc::new(FakeHttp::new()));
        let src = root.path().join("wide.png");

        let untouched = r.apply_image_filters(&scene(src.clone(), false), &[], DIMS, &ws).await;
        let frames = build_frame_list(vec![(untouched, 2.0)]);
        r.render_final(&frames, &root.path().join("out.mp4"), DIMS, profile(), &ws, &no_ticks())
            .await
            .unwrap();

        let args = &runner.calls()[0].1;
        let chain = args
            .windows(2)
            .find(|w| w[0] == "-vf")
            .map(|w| w[1].clone())
            .unwrap();
        assert!(chain.contains("force_original_aspect_ratio=increase"));
        assert!(chain.contains("crop=w="));
        assert!(!chain.contains("decrease"));
    }

    #[tokio::test]
    async fn test_image_without_fragments_is_untouched() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace(root.path());
        let runner = Arc::new(FakeRunner::succeeding());
        let r = renderer(runner.clone(), Arc::new(FakeHttp::new()));
        let src = root.path().join("bg.png");

        let out = r.apply_image_filters(&scene(src.clone(), false), &[], DIMS, &ws).await;

        assert_eq!(out, src);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_verify_parses_probe() {
        let runner = Arc::new(FakeRunner::new(|program, _| {
            assert!(program.contains("ffprobe"));
            ok(r#"{"streams":[{"codec_name":"h264","width":768,"height":1344}],"format":{"duration":"7.500000"}}"#)
        }));
        let r = renderer(runner, Arc::new(FakeHttp::new()));

        let summary = r.verify(Path::new("/tmp/out.mp4"), 7.5, DIMS).await.unwrap();

        assert_eq!(summary.codec, "h264");
        assert_eq!((summary.width, summary.height), (768, 1344));
        assert!((summary.duration_secs - 7.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_verify_reports_mismatch() {
        let runner = Arc::new(FakeRunner::new(|_, _| {
            ok(r#"{"streams":[{"codec_name":"hevc","width":720,"height":1280}],"format":{"duration":"3.0"}}"#)
        }));
        let r = renderer(runner, Arc::new(FakeHttp::new()));

        let err = r.verify(Path::new("/tmp/out.mp4"), 7.5, DIMS).await.unwrap_err();

        assert!(!err.is_fatal());
        match err {
            AdforgeError::Verification { message } => {
                assert!(message.contains("duration"));
                assert!(message.contains("720x1280"));
                assert!(message.contains("hevc"));
            }
            other => panic!("expected verification error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_verify_without_probe_output_is_error() {
        let runner = Arc::new(FakeRunner::new(|_, _| failed("moov atom not found")));
        let r = renderer(runner, Arc::new(FakeHttp::new()));

        let err = r.verify(Path::new("/tmp/out.mp4"), 7.5, DIMS).await.unwrap_err();
        assert!(matches!(err, AdforgeError::Verification { .. }));
    }

    #[test]
    fn test_progress_state_eta() {
        let mut state = ProgressState::default();
        state.update("out_time_us", "2500000");
        let tick = state.tick(10.0, 5.0);
        assert!((tick.fraction - 0.25).abs() < 1e-9);
        assert!((tick.eta_secs - 15.0).abs() < 1e-9);
        state.update("progress", "end");
        assert_eq!(state.tick(10.0, 6.0).fraction, 1.0);
    }
}
