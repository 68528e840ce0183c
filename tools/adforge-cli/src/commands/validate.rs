//! Validate a render request.

use std::path::PathBuf;

use super::load_request;

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    println!("Validating request at: {}", path.display());

    let request = load_request(&path)?;
    let target = request.target();

    println!("  Project: {}", request.project_id);
    println!("  Format: {} ({})", request.format, target.dimensions());
    let profile = target.profile();
    println!(
        "  Quality: {} ({} kbps @ {} fps)",
        request.quality.as_str(),
        profile.video_bitrate_kbps,
        profile.fps
    );
    println!("  Total duration: {:.2}s", request.total_duration());

    let mut issues: Vec<String> = Vec::new();
    if let Err(e) = request.validate() {
        issues.push(e.to_string());
    }
    if !request.format.is_recognized() {
        issues.push(format!("unknown format {}, will render at 9:16", request.format));
    }

    for scene in request.scenes_in_order() {
        let (elements, rejected) = scene.elements_in_paint_order();
        let media = if scene.use_animated_version() {
            "clip"
        } else if scene.background_url.is_some() {
            "image"
        } else {
            "placeholder"
        };
        println!(
            "  Scene {}: {:.2}s, {media}, {} element(s)",
            scene.order,
            scene.duration,
            elements.len()
        );
        for element in &elements {
            println!("     {} [{}] z={}", element.id, element.kind.name(), element.z_index);
        }
        for err in rejected {
            issues.push(format!("scene {}: {err}", scene.order));
        }
        if scene.background_url.is_none() && !scene.use_animated_version() {
            issues.push(format!("scene {} has no media and will use a placeholder", scene.order));
        }
    }

    if issues.is_empty() {
        println!("\nRequest is valid.");
        Ok(())
    } else {
        println!("\nValidation issues:");
        for issue in &issues {
            println!("  - {issue}");
        }
        match request.validate() {
            Ok(()) => {
                println!("\n{} issue(s) found. The request will still render.", issues.len());
                Ok(())
            }
            Err(e) => Err(anyhow::anyhow!("Request cannot be rendered: {e}")),
        }
    }
}
