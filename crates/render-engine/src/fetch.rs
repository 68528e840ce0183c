//! Asset fetching: HTTP, local files, `file://` and `data:` URLs, with
//! bounded retries and one forced presign refresh on authorization errors.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use adforge_common::config::DownloadSettings;
use adforge_common::error::{AdforgeError, AdforgeResult};
use async_trait::async_trait;
use base64::Engine as _;
use percent_encoding::percent_decode_str;
use sha2::{Digest, Sha256};
use tokio::time::sleep;
use url::Url;

use crate::storage::UrlRefresher;

/// Failure of a single fetch attempt.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("empty response from {url}")]
    Empty { url: String },

    #[error("invalid source {source_ref}: {message}")]
    InvalidSource { source_ref: String, message: String },

    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 401/403: the URL's signature expired or was never valid.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }
}

/// HTTP GET collaborator.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// Fetch the full body of `url`. Non-2xx statuses are errors.
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError>;

    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let bytes = self.get(url).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// [`HttpFetch`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration) -> AdforgeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            // A plain agent makes the font catalog answer with TTF sources.
            .user_agent(concat!("adforge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AdforgeError::config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        };
        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().await.map_err(transport)?;
        Ok(bytes.to_vec())
    }
}

/// Fixed-delay retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&DownloadSettings::default())
    }
}

impl From<&DownloadSettings> for RetryPolicy {
    fn from(settings: &DownloadSettings) -> Self {
        Self::new(settings.attempts, settings.retry_delay())
    }
}

/// Run `operation` until it succeeds or the policy's attempts run out.
/// Returns the last error.
pub async fn retry_operation<F, Fut, T>(
    policy: RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, FetchError>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 >= attempts => return Err(err),
            Err(err) => {
                attempt += 1;
                tracing::warn!(
                    attempt,
                    wait = ?policy.delay,
                    stage = label,
                    error = %err,
                    "Retrying operation"
                );
                if !policy.delay.is_zero() {
                    sleep(policy.delay).await;
                }
            }
        }
    }
}

/// Where an asset reference points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSource {
    Local(PathBuf),
    Data { mime: String, bytes: Vec<u8> },
    Remote(String),
}

impl AssetSource {
    pub fn parse(reference: &str) -> Result<Self, FetchError> {
        let reference = reference.trim();
        let invalid = |message: &str| FetchError::InvalidSource {
            source_ref: truncate(reference, 64),
            message: message.to_string(),
        };

        if reference.is_empty() {
            return Err(invalid("empty reference"));
        }
        if let Some(rest) = reference.strip_prefix("data:") {
            return parse_data_url(rest).ok_or_else(|| invalid("malformed data URL"));
        }
        match Url::parse(reference) {
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map(AssetSource::Local)
                .map_err(|_| invalid("invalid file URL")),
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                Ok(AssetSource::Remote(reference.to_string()))
            }
            // Windows drive letters parse as a one-letter scheme.
            Ok(url) if url.scheme().len() > 1 => Err(invalid("unsupported URL scheme")),
            _ => Ok(AssetSource::Local(PathBuf::from(reference))),
        }
    }
}

fn parse_data_url(rest: &str) -> Option<AssetSource> {
    let (meta, payload) = rest.split_once(',')?;
    let is_base64 = meta.ends_with(";base64");
    let mime = meta
        .trim_end_matches(";base64")
        .split(';')
        .next()
        .unwrap_or_default()
        .to_string();
    let bytes = if is_base64 {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .ok()?
    } else {
        percent_decode_str(payload).collect()
    };
    Some(AssetSource::Data { mime, bytes })
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

/// File extension for a reference: the URL path's extension when it has
/// a short alphanumeric one, else `default_ext`.
pub fn extension_for(reference: &str, default_ext: &str) -> String {
    let path = Url::parse(reference)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| reference.to_string());
    Path::new(&path)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| default_ext.to_string())
}

fn extension_for_mime(mime: &str, default_ext: &str) -> String {
    match mime {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        _ => default_ext,
    }
    .to_string()
}

/// Short stable digest of a reference, for cache-friendly file names.
pub fn reference_digest(reference: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(reference.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

/// Downloads scene media and overlays into a job directory.
pub struct Downloader {
    http: Arc<dyn HttpFetch>,
    urls: Arc<UrlRefresher>,
    policy: RetryPolicy,
}

impl Downloader {
    pub fn new(http: Arc<dyn HttpFetch>, urls: Arc<UrlRefresher>, policy: RetryPolicy) -> Self {
        Self { http, urls, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Fetch `reference` into `dir/<stem>.<ext>`.
    ///
    /// Remote references are retried per the policy. A 401/403 on an
    /// object-storage URL triggers one presign refresh that does not count
    /// against the attempt budget.
    pub async fn download_to(
        &self,
        reference: &str,
        dir: &Path,
        stem: &str,
        default_ext: &str,
    ) -> AdforgeResult<PathBuf> {
        let source = AssetSource::parse(reference)
            .map_err(|e| AdforgeError::asset_download(reference, 0, e.to_string()))?;

        tokio::fs::create_dir_all(dir).await?;

        match source {
            AssetSource::Local(path) => {
                if !path.is_file() {
                    return Err(AdforgeError::FileNotFound { path });
                }
                let dest = dir.join(format!("{stem}.{}", extension_for(reference, default_ext)));
                tokio::fs::copy(&path, &dest).await?;
                Ok(dest)
            }
            AssetSource::Data { mime, bytes } => {
                if bytes.is_empty() {
                    return Err(AdforgeError::asset_download("data:", 1, "empty data URL"));
                }
                let dest = dir.join(format!("{stem}.{}", extension_for_mime(&mime, default_ext)));
                tokio::fs::write(&dest, bytes).await?;
                Ok(dest)
            }
            AssetSource::Remote(url) => {
                let dest = dir.join(format!("{stem}.{}", extension_for(&url, default_ext)));
                let bytes = self.fetch_remote(&url).await?;
                tokio::fs::write(&dest, bytes).await?;
                Ok(dest)
            }
        }
    }

    async fn fetch_remote(&self, original: &str) -> AdforgeResult<Vec<u8>> {
        let attempts = self.policy.attempts;
        let mut url = self.urls.prepare(original).await;
        let mut refreshed = false;
        let mut failures = 0;

        loop {
            let err = match self.http.get(&url).await {
                Ok(bytes) if !bytes.is_empty() => {
                    if failures > 0 {
                        tracing::info!(url = original, attempt = failures + 1, "Download recovered");
                    }
                    return Ok(bytes);
                }
                Ok(_) => FetchError::Empty { url: url.clone() },
                Err(err) => err,
            };

            if err.is_auth_failure() && !refreshed && self.urls.is_refreshable(original) {
                refreshed = true;
                tracing::warn!(url = original, error = %err, "Authorization failed, refreshing presigned URL");
                if let Some(fresh) = self.urls.refresh(original).await {
                    url = fresh;
                    continue;
                }
            }

            failures += 1;
            if failures >= attempts {
                return Err(AdforgeError::asset_download(original, attempts, err.to_string()));
            }
            tracing::warn!(
                url = original,
                attempt = failures,
                attempts,
                wait = ?self.policy.delay,
                error = %err,
                "Download failed, retrying"
            );
            if !self.policy.delay.is_zero() {
                sleep(self.policy.delay).await;
            }
        }
    }
}
