//! Resolve a font family the way text elements do.

use adforge_common::config::AppConfig;
use adforge_layout::detect_script;
use adforge_render_engine::{FontRequest, FontSelection, RenderEngine};

pub async fn run(
    config: AppConfig,
    family: String,
    weight: u16,
    italic: bool,
    sample: Option<String>,
) -> anyhow::Result<()> {
    let engine = RenderEngine::builder(config).build()?;

    let mut request = FontRequest::new(family.clone(), weight).italic(italic);
    if let Some(text) = &sample {
        println!("  Sample script: {}", detect_script(text));
        request = request.sample(text.clone());
    }

    println!("Resolving font: {family} {weight}{}", if italic { " italic" } else { "" });
    match engine.fonts().select(&request).await {
        FontSelection::File(resolved) => {
            println!("[OK] {} ({})", resolved.font.family, resolved.source.as_str());
            println!("     Weight: {}", resolved.font.weight);
            println!("     Italic: {}", resolved.font.italic);
            println!("     Path: {}", resolved.font.path.display());
        }
        FontSelection::Family(name) => {
            println!("[WARN] No font file resolved; ffmpeg will look up family \"{name}\"");
        }
    }
    Ok(())
}
