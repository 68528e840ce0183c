//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory under which per-job working directories are created.
    pub work_root: PathBuf,

    /// Keep the job working directory after a successful render.
    pub keep_work_dir: bool,

    /// Font lookup and caching.
    pub fonts: FontSettings,

    /// Asset download behaviour.
    pub download: DownloadSettings,

    /// Object storage URL handling.
    pub storage: StorageSettings,

    /// Encoder binaries and presets.
    pub encoder: EncoderSettings,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Font lookup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FontSettings {
    /// Application fonts directory (also receives downloaded fonts).
    pub fonts_dir: PathBuf,

    /// System font directories scanned after `fonts_dir`.
    pub system_dirs: Vec<PathBuf>,

    /// Directory holding copies of resolved fonts under filter-safe names.
    pub sanitized_dir: PathBuf,

    /// Family used when everything else fails.
    pub default_family: String,

    /// Font catalog CSS endpoint.
    pub catalog_url: String,
}

/// Download retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    /// Total attempts per asset (including the first).
    pub attempts: u32,

    /// Fixed delay between attempts.
    pub retry_delay_ms: u64,

    /// Per-request timeout.
    pub timeout_secs: u64,
}

/// Object storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Lifetime requested for presigned URLs.
    pub presign_ttl_secs: u64,

    /// Extra hostname suffixes treated as object storage, e.g.
    /// `storage.example.com`. Path-style: first path segment is the bucket.
    pub extra_hosts: Vec<String>,

    /// Presign object URLs through the `aws` CLI.
    pub presign_with_aws_cli: bool,

    /// `--endpoint-url` for S3-compatible stores (R2, MinIO).
    pub endpoint_url: Option<String>,
}

/// Encoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    /// ffmpeg binary.
    pub ffmpeg: String,

    /// ffprobe binary.
    pub ffprobe: String,

    /// x264 preset.
    pub preset: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "adforge=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            work_root: std::env::temp_dir().join("adforge"),
            keep_work_dir: false,
            fonts: FontSettings::default(),
            download: DownloadSettings::default(),
            storage: StorageSettings::default(),
            encoder: EncoderSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for FontSettings {
    fn default() -> Self {
        let data = data_dir();
        Self {
            fonts_dir: data.join("fonts"),
            system_dirs: default_system_font_dirs(),
            sanitized_dir: std::env::temp_dir().join("adforge-fonts"),
            default_family: "Noto Sans".to_string(),
            catalog_url: "https://fonts.googleapis.com/css2".to_string(),
        }
    }
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            retry_delay_ms: 1000,
            timeout_secs: 60,
        }
    }
}

impl DownloadSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            presign_ttl_secs: 3600,
            extra_hosts: vec![],
            presign_with_aws_cli: false,
            endpoint_url: None,
        }
    }
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            preset: "medium".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load config from an explicit file. Unlike [`AppConfig::load`] this
    /// reports errors, since the caller asked for that file specifically.
    pub fn load_from(path: &std::path::Path) -> Result<Self, crate::AdforgeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::AdforgeError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            crate::AdforgeError::config(format!("cannot parse {}: {e}", path.display()))
        })
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"));
    base.join("adforge").join("config.json")
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local").join("share"))
        .join("adforge")
}

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
}

fn default_system_font_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![
        PathBuf::from("/usr/share/fonts"),
        PathBuf::from("/usr/local/share/fonts"),
        home_dir().join(".fonts"),
        home_dir().join(".local").join("share").join("fonts"),
    ];
    if cfg!(target_os = "macos") {
        dirs.push(PathBuf::from("/Library/Fonts"));
        dirs.push(PathBuf::from("/System/Library/Fonts"));
    }
    if cfg!(target_os = "windows") {
        dirs.push(PathBuf::from("C:\\Windows\\Fonts"));
    }
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_defaults_match_retry_budget() {
        let config = AppConfig::default();
        assert_eq!(config.download.attempts, 3);
        assert_eq!(config.download.retry_delay(), Duration::from_millis(1000));
        assert_eq!(config.fonts.default_family, "Noto Sans");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{"keep_work_dir": true, "download": {"attempts": 5}}"#)
                .unwrap();
        assert!(parsed.keep_work_dir);
        assert_eq!(parsed.download.attempts, 5);
        assert_eq!(parsed.download.retry_delay_ms, 1000);
        assert_eq!(parsed.encoder.ffmpeg, "ffmpeg");
    }

    #[test]
    fn test_load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("cannot parse"));
    }
}
