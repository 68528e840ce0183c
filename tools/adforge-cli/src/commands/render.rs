//! Render a request to video.

use std::io::Write;
use std::path::PathBuf;

use adforge_common::config::AppConfig;
use adforge_render_engine::{RenderEngine, RenderJob, RenderProgress, RenderStage};
use adforge_scene_model::AspectFormat;

use super::{load_request, parse_quality};

pub struct RenderArgs {
    pub request: PathBuf,
    pub output: Option<PathBuf>,
    pub format: Option<String>,
    pub quality: Option<String>,
    pub offline_fonts: bool,
}

pub async fn run(config: AppConfig, args: RenderArgs) -> anyhow::Result<()> {
    let mut request = load_request(&args.request)?;
    if let Some(format) = &args.format {
        request.format = AspectFormat::parse(format);
        if !request.format.is_recognized() {
            println!("  Warning: unknown format {format}, rendering at 9:16");
        }
    }
    if let Some(quality) = &args.quality {
        request.quality = parse_quality(quality)?;
    }

    let output_path = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("{}.mp4", adforge_common::sanitize_component(&request.project_id))));
    let dims = request.target().dimensions();

    println!("Rendering request: {}", args.request.display());
    println!("  Project: {}", request.project_id);
    println!("  Scenes: {} ({:.1}s)", request.scenes.len(), request.total_duration());
    println!("  Format: {} ({dims})", request.format);
    println!("  Quality: {}", request.quality.as_str());
    println!("  Output: {}", output_path.display());

    let mut builder = RenderEngine::builder(config);
    if args.offline_fonts {
        builder = builder.without_font_catalog();
    }
    let engine = builder.build()?;

    let progress_cb: Box<dyn Fn(RenderProgress) + Send + Sync> = Box::new(|p| {
        let detail = match p.stage {
            RenderStage::CompositingScenes => format!("{}/{} scenes", p.scenes_done, p.total_scenes),
            RenderStage::Encoding => format!("ETA: {:.0}s", p.eta_secs),
            _ => String::new(),
        };
        print!("\r  Progress: {:>5.1}% {:<18} {:<16}", p.progress * 100.0, format!("{:?}", p.stage), detail);
        std::io::stdout().flush().ok();
    });

    match engine
        .render_video(
            RenderJob {
                request,
                output_path,
            },
            Some(progress_cb),
        )
        .await
    {
        Ok(path) => {
            println!("\nRender complete: {}", path.display());
            Ok(())
        }
        Err(e) => {
            println!("\nRender failed: {e}");
            Err(e.into())
        }
    }
}
