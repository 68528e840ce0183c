//! Adforge CLI: command-line interface for rendering ad videos.
//!
//! Usage:
//!   adforge render <REQUEST>     Render a request to an .mp4
//!   adforge validate <REQUEST>   Check a request without rendering
//!   adforge font <FAMILY>        Resolve a font the way the renderer would
//!   adforge check                Check system capabilities
//!   adforge formats              List aspect formats and quality tiers

use std::path::PathBuf;

use adforge_common::config::AppConfig;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "adforge",
    about = "Composite AI-generated ad scenes into finished videos",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a request JSON file to video
    Render {
        /// Path to the render request JSON
        request: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override the request's aspect format (9:16, 16:9, 1:1, 4:5)
        #[arg(long)]
        format: Option<String>,

        /// Override the request's quality (high, medium, low)
        #[arg(long)]
        quality: Option<String>,

        /// Keep the job working directory after rendering
        #[arg(long)]
        keep_work_dir: bool,

        /// Never download fonts from the font catalog
        #[arg(long)]
        offline_fonts: bool,
    },

    /// Validate a render request without rendering
    Validate {
        /// Path to the render request JSON
        request: PathBuf,
    },

    /// Resolve a font family
    Font {
        /// Font family name
        family: String,

        /// Font weight (100-900)
        #[arg(long, default_value = "400")]
        weight: u16,

        /// Prefer the italic variant
        #[arg(long)]
        italic: bool,

        /// Sample text, used to pick a script-appropriate fallback
        #[arg(long)]
        sample: Option<String>,
    },

    /// Check system capabilities
    Check,

    /// List supported aspect formats and quality tiers
    Formats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {e}", path.display()))?,
        None => AppConfig::load(),
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    adforge_common::logging::init_logging(&config.logging);
    tracing::debug!(
        work_root = %config.work_root.display(),
        fonts_dir = %config.fonts.fonts_dir.display(),
        "Loaded configuration"
    );

    match cli.command {
        Commands::Render {
            request,
            output,
            format,
            quality,
            keep_work_dir,
            offline_fonts,
        } => {
            config.keep_work_dir |= keep_work_dir;
            commands::render::run(
                config,
                commands::render::RenderArgs {
                    request,
                    output,
                    format,
                    quality,
                    offline_fonts,
                },
            )
            .await
        }
        Commands::Validate { request } => commands::validate::run(request),
        Commands::Font {
            family,
            weight,
            italic,
            sample,
        } => commands::font::run(config, family, weight, italic, sample).await,
        Commands::Check => commands::check::run(&config),
        Commands::Formats => commands::formats::run(),
    }
}
