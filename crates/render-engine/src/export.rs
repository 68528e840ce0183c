//! Render jobs: from a request to a finished `.mp4`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use adforge_common::config::AppConfig;
use adforge_common::error::{AdforgeError, AdforgeResult};
use adforge_common::JobWorkspace;
use adforge_scene_model::{AspectFormat, FrameList, RenderRequest};
use futures::future::join_all;

use crate::assets::{AssetProcessor, ProcessedScene};
use crate::elements::{ElementRenderer, FilterFragment};
use crate::fetch::{Downloader, HttpFetch, ReqwestFetcher, RetryPolicy};
use crate::fonts::{FontCache, FontCatalog, FontResolver, GoogleFontsCatalog};
use crate::renderer::{build_frame_list, concat_manifest, EncodeTick, FfmpegRenderer, FinalRender};
use crate::runner::{CommandRunner, SystemCommandRunner};
use crate::storage::{AwsCliPresigner, ObjectStorage, PresignedUrlCache, UrlRefresher};

/// A render job ready to run.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub request: RenderRequest,

    /// Output file path. Relative paths resolve against the current
    /// directory.
    pub output_path: PathBuf,
}

/// Progress callback for render jobs.
pub type ProgressCallback = Box<dyn Fn(RenderProgress) + Send + Sync>;

/// Render progress report.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderProgress {
    /// Overall progress [0.0, 1.0].
    pub progress: f64,

    /// Current stage.
    pub stage: RenderStage,

    /// Scenes composited so far.
    pub scenes_done: usize,

    pub total_scenes: usize,

    /// Estimated time remaining in seconds (encoding only).
    pub eta_secs: f64,
}

/// Stages of a render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    Preparing,
    DownloadingAssets,
    CompositingScenes,
    Encoding,
    Verifying,
    Complete,
    Failed,
}

impl RenderStage {
    /// Share of overall progress reached when the stage starts.
    fn start(self) -> f64 {
        match self {
            Self::Preparing => 0.0,
            Self::DownloadingAssets => 0.05,
            Self::CompositingScenes => 0.25,
            Self::Encoding => 0.55,
            Self::Verifying => 0.95,
            Self::Complete => 1.0,
            Self::Failed => 0.0,
        }
    }

    fn span(self) -> f64 {
        match self {
            Self::DownloadingAssets => 0.20,
            Self::CompositingScenes => 0.30,
            Self::Encoding => 0.40,
            Self::Verifying => 0.05,
            _ => 0.0,
        }
    }
}

struct Reporter<'a> {
    callback: Option<&'a ProgressCallback>,
    total_scenes: usize,
}

impl Reporter<'_> {
    fn emit(&self, stage: RenderStage, within: f64, scenes_done: usize, eta_secs: f64) {
        if let Some(cb) = self.callback {
            cb(RenderProgress {
                progress: (stage.start() + stage.span() * within.clamp(0.0, 1.0)).clamp(0.0, 1.0),
                stage,
                scenes_done,
                total_scenes: self.total_scenes,
                eta_secs,
            });
        }
    }

    fn stage(&self, stage: RenderStage, scenes_done: usize) {
        self.emit(stage, 0.0, scenes_done, 0.0);
    }
}

/// Builds a [`RenderEngine`], defaulting every collaborator not supplied.
pub struct RenderEngineBuilder {
    config: AppConfig,
    http: Option<Arc<dyn HttpFetch>>,
    catalog: Option<Arc<dyn FontCatalog>>,
    use_catalog: bool,
    storage: Option<Arc<dyn ObjectStorage>>,
    runner: Option<Arc<dyn CommandRunner>>,
    font_cache: Option<Arc<FontCache>>,
    url_cache: Option<Arc<PresignedUrlCache>>,
}

impl RenderEngineBuilder {
    pub fn http(mut self, http: Arc<dyn HttpFetch>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn font_catalog(mut self, catalog: Arc<dyn FontCatalog>) -> Self {
        self.catalog = Some(catalog);
        self.use_catalog = true;
        self
    }

    /// Never download fonts; only local files and fallbacks are used.
    pub fn without_font_catalog(mut self) -> Self {
        self.catalog = None;
        self.use_catalog = false;
        self
    }

    pub fn storage(mut self, storage: Arc<dyn ObjectStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Share a font cache with other engines.
    pub fn font_cache(mut self, cache: Arc<FontCache>) -> Self {
        self.font_cache = Some(cache);
        self
    }

    /// Share a presigned URL cache with other engines.
    pub fn url_cache(mut self, cache: Arc<PresignedUrlCache>) -> Self {
        self.url_cache = Some(cache);
        self
    }

    pub fn build(self) -> AdforgeResult<RenderEngine> {
        let config = self.config;
        let http: Arc<dyn HttpFetch> = match self.http {
            Some(http) => http,
            None => Arc::new(ReqwestFetcher::new(config.download.timeout())?),
        };
        let runner: Arc<dyn CommandRunner> = self
            .runner
            .unwrap_or_else(|| Arc::new(SystemCommandRunner::new()));

        let storage = match self.storage {
            Some(storage) => Some(storage),
            None if config.storage.presign_with_aws_cli => Some(Arc::new(AwsCliPresigner::new(
                runner.clone(),
                config.storage.endpoint_url.clone(),
            )) as Arc<dyn ObjectStorage>),
            None => None,
        };
        let urls = Arc::new(UrlRefresher::new(
            storage,
            self.url_cache.unwrap_or_default(),
            Duration::from_secs(config.storage.presign_ttl_secs.max(60)),
            config.storage.extra_hosts.clone(),
        ));

        let policy = RetryPolicy::from(&config.download);
        let downloader = Arc::new(Downloader::new(http.clone(), urls, policy));

        let catalog = match (self.catalog, self.use_catalog) {
            (Some(catalog), true) => Some(catalog),
            (None, true) => Some(Arc::new(GoogleFontsCatalog::new(
                http.clone(),
                config.fonts.catalog_url.clone(),
            )) as Arc<dyn FontCatalog>),
            (_, false) => None,
        };
        let fonts = Arc::new(FontResolver::new(
            self.font_cache.unwrap_or_default(),
            catalog,
            http,
            config.fonts.clone(),
            policy,
        ));

        Ok(RenderEngine {
            renderer: FfmpegRenderer::new(runner.clone(), downloader.clone(), config.encoder.clone()),
            assets: AssetProcessor::new(downloader),
            elements: ElementRenderer::new(fonts),
            runner,
            config,
        })
    }
}

/// Runs render jobs. One engine may serve many jobs; font and presigned
/// URL caches live as long as the engine.
pub struct RenderEngine {
    config: AppConfig,
    runner: Arc<dyn CommandRunner>,
    assets: AssetProcessor,
    elements: ElementRenderer,
    renderer: FfmpegRenderer,
}

impl RenderEngine {
    pub fn builder(config: AppConfig) -> RenderEngineBuilder {
        RenderEngineBuilder {
            config,
            http: None,
            catalog: None,
            use_catalog: true,
            storage: None,
            runner: None,
            font_cache: None,
            url_cache: None,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Font resolver shared by every job on this engine.
    pub fn fonts(&self) -> &Arc<FontResolver> {
        self.elements.fonts()
    }

    /// Whether the configured ffmpeg runs.
    pub async fn is_available(&self) -> bool {
        let args = vec!["-version".to_string()];
        matches!(
            self.runner.run(&self.config.encoder.ffmpeg, &args).await,
            Ok(out) if out.success
        )
    }

    /// Render `job` and return the absolute path of the finished video.
    ///
    /// Every per-asset, per-font, and per-scene failure degrades locally;
    /// only a rejected request, a missing encoder, or exhausting every
    /// encode strategy fails the job. On failure no partial output is left
    /// behind.
    pub async fn render_video(&self, job: RenderJob, progress: Option<ProgressCallback>) -> AdforgeResult<PathBuf> {
        job.request
            .validate()
            .map_err(|e| AdforgeError::invalid_request(e.to_string()))?;

        let output = absolute(&job.output_path)?;
        let reporter = Reporter {
            callback: progress.as_ref(),
            total_scenes: job.request.scenes.len(),
        };
        tracing::info!(
            project = %job.request.project_id,
            output = %output.display(),
            format = %job.request.format,
            quality = job.request.quality.as_str(),
            scenes = job.request.scenes.len(),
            "Starting render"
        );
        reporter.stage(RenderStage::Preparing, 0);

        if !self.is_available().await {
            reporter.stage(RenderStage::Failed, 0);
            return Err(AdforgeError::unsupported(format!(
                "ffmpeg not available (tried `{}`)",
                self.config.encoder.ffmpeg
            )));
        }

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let workspace = JobWorkspace::create(&self.config.work_root, &job.request.project_id)?;

        let started = Instant::now();
        let result = self.run_job(&job.request, &output, &workspace, &reporter).await;

        match &result {
            Ok(_) => {
                tracing::info!(
                    output = %output.display(),
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "Render finished"
                );
                reporter.stage(RenderStage::Complete, reporter.total_scenes);
            }
            Err(err) => {
                tracing::error!(error = %err, "Render failed");
                if output.exists() {
                    if let Err(rm) = tokio::fs::remove_file(&output).await {
                        tracing::warn!(error = %rm, path = %output.display(), "Failed to remove partial output");
                    }
                }
                reporter.stage(RenderStage::Failed, 0);
            }
        }

        if self.config.keep_work_dir {
            tracing::info!(path = %workspace.root().display(), "Keeping job workspace");
        } else {
            workspace.cleanup();
        }

        result.map(|_| output)
    }

    async fn run_job(
        &self,
        request: &RenderRequest,
        output: &Path,
        workspace: &JobWorkspace,
        reporter: &Reporter<'_>,
    ) -> AdforgeResult<()> {
        let target = request.target();
        if !target.format.is_recognized() {
            tracing::warn!(format = %target.format, "Unrecognized format, rendering at the 9:16 baseline");
        }
        let dims = target.dimensions();
        let profile = target.profile();

        reporter.stage(RenderStage::DownloadingAssets, 0);
        let scenes = request.scenes_in_order();
        let processed = self.assets.process(&scenes, &workspace.assets_dir(), dims).await?;
        let placeholders = processed.iter().filter(|s| s.placeholder).count();
        if placeholders > 0 {
            tracing::warn!(placeholders, "Some scenes render with placeholder media");
        }

        reporter.stage(RenderStage::CompositingScenes, 0);
        let mut entries = Vec::with_capacity(processed.len());
        for (done, scene) in processed.iter().enumerate() {
            let fragments = self.scene_fragments(scene, &target.format, dims.width, dims.height).await;
            let path = if scene.is_video {
                self.renderer
                    .apply_video_filters(scene, &fragments, dims, profile, workspace)
                    .await
            } else {
                self.renderer
                    .apply_image_filters(scene, &fragments, dims, workspace)
                    .await
            };
            entries.push((path, scene.duration));
            reporter.emit(
                RenderStage::CompositingScenes,
                (done + 1) as f64 / processed.len() as f64,
                done + 1,
                0.0,
            );
        }

        let frames = build_frame_list(entries);
        let declared = request.total_duration();
        if (frames.total_duration() - declared).abs() > 0.01 {
            tracing::warn!(
                declared_secs = declared,
                frame_list_secs = frames.total_duration(),
                "Frame list duration differs from declared scene durations"
            );
        }

        reporter.stage(RenderStage::Encoding, processed.len());
        let on_tick = |tick: EncodeTick| {
            reporter.emit(RenderStage::Encoding, tick.fraction, processed.len(), tick.eta_secs);
        };
        let render = self
            .renderer
            .render_final(&frames, output, dims, profile, workspace, &on_tick)
            .await?;
        write_debug_report(workspace, &frames, &render).await;

        reporter.stage(RenderStage::Verifying, processed.len());
        if let Err(err) = self.renderer.verify(output, frames.total_duration(), dims).await {
            tracing::warn!(output = %output.display(), error = %err, "Output verification failed");
        }
        Ok(())
    }

    /// Element fragments in paint order. Elements render concurrently so
    /// their fonts resolve in parallel.
    async fn scene_fragments(
        &self,
        scene: &ProcessedScene,
        format: &AspectFormat,
        width: u32,
        height: u32,
    ) -> Vec<FilterFragment> {
        let rendered = join_all(
            scene
                .elements
                .iter()
                .map(|element| self.elements.render(element, width, height, format)),
        )
        .await;
        let fragments: Vec<FilterFragment> = rendered.into_iter().flatten().collect();
        tracing::debug!(
            scene = scene.index,
            elements = scene.elements.len(),
            fragments = fragments.len(),
            "Rendered scene elements"
        );
        fragments
    }
}

fn absolute(path: &Path) -> AdforgeResult<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Strategy, failures, frame list, and ffmpeg arguments of the final pass.
async fn write_debug_report(workspace: &JobWorkspace, frames: &FrameList, render: &FinalRender) {
    let mut report = String::new();
    report.push_str(&format!("strategy: {}\n", render.strategy));
    report.push_str(&format!("output: {}\n", render.output.display()));
    report.push_str(&format!("total_secs: {:.3}\n", frames.total_duration()));
    for (strategy, err) in &render.failures {
        report.push_str(&format!("failed {strategy}: {err}\n"));
    }
    report.push_str("\n# frame list\n");
    report.push_str(&concat_manifest(frames.entries()));
    report.push_str("\n# ffmpeg args\n");
    report.push_str(&render.ffmpeg_args.join(" "));
    report.push('\n');

    let path = workspace.root().join("ffmpeg-debug.txt");
    if let Err(err) = tokio::fs::write(&path, report).await {
        tracing::warn!(error = %err, path = %path.display(), "Failed to write ffmpeg debug report");
    } else {
        tracing::info!(path = %path.display(), "Wrote ffmpeg debug report");
    }
}
