//! Check system capabilities.

use adforge_common::config::{config_file_path, AppConfig};
use adforge_render_engine::command_exists;

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Adforge System Check");
    println!("{}", "=".repeat(50));

    let config_path = config_file_path();
    if config_path.exists() {
        println!("[OK] Config: {}", config_path.display());
    } else {
        println!("[OK] Config: defaults ({} not found)", config_path.display());
    }

    let mut all_required_ok = true;
    for (binary, required) in [
        (config.encoder.ffmpeg.as_str(), true),
        (config.encoder.ffprobe.as_str(), false),
    ] {
        if command_exists(binary) {
            println!("[OK] {binary} found");
        } else if required {
            println!("[FAIL] {binary} not found in PATH");
            all_required_ok = false;
        } else {
            println!("[WARN] {binary} not found; output verification is skipped");
        }
    }

    if config.storage.presign_with_aws_cli {
        if command_exists("aws") {
            println!("[OK] aws CLI found (object URLs are presigned)");
        } else {
            println!("[WARN] aws CLI not found; object URLs are downloaded unsigned");
        }
    }

    let fonts = &config.fonts;
    if fonts.fonts_dir.is_dir() {
        println!("[OK] Fonts directory: {}", fonts.fonts_dir.display());
    } else {
        println!("[WARN] Fonts directory missing: {}", fonts.fonts_dir.display());
    }
    let system_dirs = fonts.system_dirs.iter().filter(|d| d.is_dir()).count();
    println!("[OK] System font directories: {system_dirs}/{}", fonts.system_dirs.len());
    println!("     Default family: {}", fonts.default_family);

    match std::fs::create_dir_all(&config.work_root) {
        Ok(()) => println!("[OK] Work root: {}", config.work_root.display()),
        Err(e) => {
            println!("[FAIL] Work root {}: {e}", config.work_root.display());
            all_required_ok = false;
        }
    }

    println!();
    if all_required_ok {
        println!("All required capabilities are available. Adforge is ready.");
    } else {
        println!("Some required capabilities are missing. See above for fixes.");
    }

    Ok(())
}
