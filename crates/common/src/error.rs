//! Error types shared across Adforge crates.
//!
//! The render core recovers locally from almost everything. Most of these
//! variants are produced, logged, and then absorbed by a fallback; only
//! [`AdforgeError::FatalJob`] is expected to reach the caller of a render.

use std::path::PathBuf;

/// Top-level error type for Adforge operations.
#[derive(Debug, thiserror::Error)]
pub enum AdforgeError {
    /// A scene or overlay asset could not be fetched after every attempt.
    #[error("Asset download failed for {source_url} after {attempts} attempt(s): {message}")]
    AssetDownload {
        source_url: String,
        attempts: u32,
        message: String,
    },

    #[error("Font resolution failed for {family} ({weight}): {message}")]
    FontResolution {
        family: String,
        weight: u16,
        message: String,
    },

    #[error("Filter application failed for scene {scene}: {message}")]
    FilterApplication { scene: usize, message: String },

    #[error("Encode strategy {strategy} failed: {message}")]
    EncodeStrategy { strategy: String, message: String },

    #[error("Output verification failed: {message}")]
    Verification { message: String },

    /// Every fallback at the job level has been exhausted.
    #[error("Render job failed: {message}")]
    FatalJob { message: String },

    #[error("Invalid render request: {message}")]
    InvalidRequest { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using AdforgeError.
pub type AdforgeResult<T> = Result<T, AdforgeError>;

impl AdforgeError {
    pub fn asset_download(
        source_url: impl Into<String>,
        attempts: u32,
        msg: impl Into<String>,
    ) -> Self {
        Self::AssetDownload {
            source_url: source_url.into(),
            attempts,
            message: msg.into(),
        }
    }

    pub fn font_resolution(family: impl Into<String>, weight: u16, msg: impl Into<String>) -> Self {
        Self::FontResolution {
            family: family.into(),
            weight,
            message: msg.into(),
        }
    }

    pub fn filter_application(scene: usize, msg: impl Into<String>) -> Self {
        Self::FilterApplication {
            scene,
            message: msg.into(),
        }
    }

    pub fn encode_strategy(strategy: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::EncodeStrategy {
            strategy: strategy.into(),
            message: msg.into(),
        }
    }

    pub fn verification(msg: impl Into<String>) -> Self {
        Self::Verification {
            message: msg.into(),
        }
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::FatalJob {
            message: msg.into(),
        }
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether the error ends the whole render job rather than one scene.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalJob { .. } | Self::InvalidRequest { .. })
    }
}
