//! Object storage URLs and presigning.
//!
//! Scene media often lives in private buckets. Plain object URLs for S3,
//! R2, and GCS are recognized by hostname and exchanged for presigned URLs
//! before download. Presigned URLs are cached per `(bucket, key)` and
//! refreshed on demand when a download is rejected with 401/403.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use adforge_common::error::{AdforgeError, AdforgeResult};
use async_trait::async_trait;
use url::Url;

use crate::runner::CommandRunner;

/// Query parameters that mark a URL as already signed.
const SIGNATURE_PARAMS: [&str; 3] = ["x-amz-signature", "signature", "x-goog-signature"];

/// Bucket and key of an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    /// Recognize an object-storage URL. `extra_hosts` are hostname
    /// suffixes addressed path-style (`https://host/<bucket>/<key>`).
    pub fn from_url(url: &Url, extra_hosts: &[String]) -> Option<Self> {
        let host = url.host_str()?.to_ascii_lowercase();
        let path = url.path().trim_start_matches('/');
        let path = percent_decode_path(path);

        // S3 path style: s3.amazonaws.com/<bucket>/<key>, s3.<region>.amazonaws.com/...
        // S3 virtual host: <bucket>.s3.amazonaws.com/<key>, <bucket>.s3.<region>.amazonaws.com/...
        if let Some(prefix) = host.strip_suffix(".amazonaws.com") {
            let labels: Vec<&str> = prefix.split('.').collect();
            let s3_at = labels
                .iter()
                .position(|l| *l == "s3" || l.starts_with("s3-"))?;
            return if s3_at == 0 {
                path_style(&path)
            } else {
                virtual_host(&labels[..s3_at].join("."), &path)
            };
        }

        // R2: <account>.r2.cloudflarestorage.com/<bucket>/<key>
        // or <bucket>.<account>.r2.cloudflarestorage.com/<key>
        if let Some(prefix) = host.strip_suffix(".r2.cloudflarestorage.com") {
            let labels: Vec<&str> = prefix.split('.').collect();
            return match labels.len() {
                1 => path_style(&path),
                n if n >= 2 => virtual_host(&labels[..n - 1].join("."), &path),
                _ => None,
            };
        }

        // GCS: storage.googleapis.com/<bucket>/<key> or <bucket>.storage.googleapis.com/<key>
        if host == "storage.googleapis.com" {
            return path_style(&path);
        }
        if let Some(bucket) = host.strip_suffix(".storage.googleapis.com") {
            return virtual_host(bucket, &path);
        }

        for extra in extra_hosts {
            let extra = extra.trim().to_ascii_lowercase();
            if !extra.is_empty() && (host == extra || host.ends_with(&format!(".{extra}"))) {
                return path_style(&path);
            }
        }
        None
    }
}

fn path_style(path: &str) -> Option<ObjectLocation> {
    let (bucket, key) = path.split_once('/')?;
    virtual_host(bucket, key)
}

fn virtual_host(bucket: &str, key: &str) -> Option<ObjectLocation> {
    if bucket.is_empty() || key.is_empty() {
        return None;
    }
    Some(ObjectLocation {
        bucket: bucket.to_string(),
        key: key.to_string(),
    })
}

fn percent_decode_path(path: &str) -> String {
    url::form_urlencoded::parse(format!("k={}", path.replace('+', "%2B").replace('&', "%26")).as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// Whether `url` already carries a signature query parameter.
pub fn has_signature(url: &Url) -> bool {
    url.query_pairs()
        .any(|(k, _)| SIGNATURE_PARAMS.contains(&k.to_ascii_lowercase().as_str()))
}

/// Presigning collaborator.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// A GET URL for `bucket/key` valid for `ttl`.
    async fn presign(&self, bucket: &str, key: &str, ttl: Duration) -> AdforgeResult<String>;
}

/// Presigns through the `aws` CLI (`aws s3 presign`). Honors the CLI's
/// usual credential chain and `--endpoint-url` for R2 and other
/// S3-compatible stores.
pub struct AwsCliPresigner {
    runner: Arc<dyn CommandRunner>,
    endpoint_url: Option<String>,
}

impl AwsCliPresigner {
    pub fn new(runner: Arc<dyn CommandRunner>, endpoint_url: Option<String>) -> Self {
        Self {
            runner,
            endpoint_url,
        }
    }
}

#[async_trait]
impl ObjectStorage for AwsCliPresigner {
    async fn presign(&self, bucket: &str, key: &str, ttl: Duration) -> AdforgeResult<String> {
        let mut args = vec![
            "s3".to_string(),
            "presign".to_string(),
            format!("s3://{bucket}/{key}"),
            "--expires-in".to_string(),
            ttl.as_secs().max(1).to_string(),
        ];
        if let Some(endpoint) = &self.endpoint_url {
            args.push("--endpoint-url".to_string());
            args.push(endpoint.clone());
        }
        let output = self.runner.run("aws", &args).await?;
        let url = output.stdout.trim();
        if !output.success || url.is_empty() {
            return Err(AdforgeError::Other(anyhow::anyhow!(
                "aws s3 presign failed for {bucket}/{key}: {}",
                output.stderr_tail(3)
            )));
        }
        Ok(url.to_string())
    }
}

#[derive(Debug, Clone)]
struct CachedUrl {
    url: String,
    expires_at: Instant,
}

/// Process-wide presigned URL cache keyed by `(bucket, key)`.
#[derive(Debug, Default)]
pub struct PresignedUrlCache {
    entries: Mutex<HashMap<ObjectLocation, CachedUrl>>,
}

impl PresignedUrlCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cached URL that is still valid for at least `margin`.
    pub fn get(&self, location: &ObjectLocation, margin: Duration) -> Option<String> {
        let entries = self.entries.lock().ok()?;
        let cached = entries.get(location)?;
        (cached.expires_at > Instant::now() + margin).then(|| cached.url.clone())
    }

    pub fn insert(&self, location: ObjectLocation, url: String, ttl: Duration) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                location,
                CachedUrl {
                    url,
                    expires_at: Instant::now() + ttl,
                },
            );
        }
    }

    pub fn invalidate(&self, location: &ObjectLocation) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(location);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Turns object-storage URLs into downloadable ones.
pub struct UrlRefresher {
    storage: Option<Arc<dyn ObjectStorage>>,
    cache: Arc<PresignedUrlCache>,
    ttl: Duration,
    extra_hosts: Vec<String>,
}

impl UrlRefresher {
    pub fn new(
        storage: Option<Arc<dyn ObjectStorage>>,
        cache: Arc<PresignedUrlCache>,
        ttl: Duration,
        extra_hosts: Vec<String>,
    ) -> Self {
        Self {
            storage,
            cache,
            ttl,
            extra_hosts,
        }
    }

    fn location(&self, raw: &str) -> Option<ObjectLocation> {
        let url = Url::parse(raw).ok()?;
        ObjectLocation::from_url(&url, &self.extra_hosts)
    }

    fn margin(&self) -> Duration {
        (self.ttl / 10).min(Duration::from_secs(300))
    }

    /// Whether a failed download of `raw` can be retried with a fresh URL.
    pub fn is_refreshable(&self, raw: &str) -> bool {
        self.storage.is_some() && self.location(raw).is_some()
    }

    /// URL to use for the first download attempt. Unsigned object URLs are
    /// presigned (cached); everything else passes through. Presign failures
    /// fall back to the original URL.
    pub async fn prepare(&self, raw: &str) -> String {
        let Ok(url) = Url::parse(raw) else {
            return raw.to_string();
        };
        if has_signature(&url) {
            return raw.to_string();
        }
        let (Some(storage), Some(location)) = (
            self.storage.as_ref(),
            ObjectLocation::from_url(&url, &self.extra_hosts),
        ) else {
            return raw.to_string();
        };

        if let Some(cached) = self.cache.get(&location, self.margin()) {
            return cached;
        }
        match storage.presign(&location.bucket, &location.key, self.ttl).await {
            Ok(signed) => {
                tracing::debug!(bucket = %location.bucket, key = %location.key, "Presigned object URL");
                self.cache.insert(location, signed.clone(), self.ttl);
                signed
            }
            Err(err) => {
                tracing::warn!(url = raw, error = %err, "Presign failed, using URL as given");
                raw.to_string()
            }
        }
    }

    /// Force a new presigned URL for `raw`, signed or not.
    pub async fn refresh(&self, raw: &str) -> Option<String> {
        let storage = self.storage.as_ref()?;
        let location = self.location(raw)?;
        self.cache.invalidate(&location);
        match storage.presign(&location.bucket, &location.key, self.ttl).await {
            Ok(signed) => {
                self.cache.insert(location, signed.clone(), self.ttl);
                Some(signed)
            }
            Err(err) => {
                tracing::warn!(url = raw, error = %err, "Presign refresh failed");
                None
            }
        }
    }
}
