//! List aspect formats and quality tiers.

use adforge_scene_model::{AspectFormat, Quality};

pub fn run() -> anyhow::Result<()> {
    println!("Aspect formats");
    println!("{}", "=".repeat(30));
    for format in AspectFormat::ALL {
        let dims = format.dimensions();
        let note = if format.is_baseline() { " (baseline)" } else { "" };
        println!("  {:<6} {:>4}x{:<4}{note}", format.as_str(), dims.width, dims.height);
    }

    println!();
    println!("Quality tiers");
    println!("{}", "=".repeat(30));
    for quality in [Quality::High, Quality::Medium, Quality::Low] {
        let profile = quality.profile();
        println!(
            "  {:<6} {:>5} kbps @ {} fps",
            quality.as_str(),
            profile.video_bitrate_kbps,
            profile.fps
        );
    }
    Ok(())
}
