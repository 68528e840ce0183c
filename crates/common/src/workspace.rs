//! Per-job working directories.
//!
//! Every render job gets a directory of its own under the configured work
//! root. Nothing inside it is shared with other jobs, so concurrent renders
//! of the same project never see each other's intermediate files.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static JOB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// An exclusive working directory for one render job.
#[derive(Debug, Clone)]
pub struct JobWorkspace {
    root: PathBuf,
}

impl JobWorkspace {
    /// Create `<work_root>/<project>-<timestamp>-<pid>-<n>` with its
    /// standard subdirectories.
    pub fn create(work_root: &Path, project_id: &str) -> std::io::Result<Self> {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f");
        let seq = JOB_COUNTER.fetch_add(1, Ordering::Relaxed);
        let name = format!(
            "{}-{stamp}-{}-{seq}",
            sanitize_component(project_id),
            std::process::id()
        );
        let root = work_root.join(name);

        for sub in [
            root.join("assets"),
            root.join("scenes"),
            root.join("overlays"),
            root.join("normalized"),
        ] {
            std::fs::create_dir_all(sub)?;
        }

        tracing::debug!(root = %root.display(), "Created job workspace");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Downloaded scene media.
    pub fn assets_dir(&self) -> PathBuf {
        self.root.join("assets")
    }

    /// Per-scene filtered media.
    pub fn scenes_dir(&self) -> PathBuf {
        self.root.join("scenes")
    }

    /// Downloaded overlay images.
    pub fn overlays_dir(&self) -> PathBuf {
        self.root.join("overlays")
    }

    /// Intermediate clips produced by mixed-content normalization.
    pub fn normalized_dir(&self) -> PathBuf {
        self.root.join("normalized")
    }

    /// Remove the directory tree. Failures are logged, not returned.
    pub fn cleanup(&self) {
        if let Err(err) = std::fs::remove_dir_all(&self.root) {
            tracing::warn!(
                path = %self.root.display(),
                error = %err,
                "Failed to remove job workspace"
            );
        }
    }
}

/// Reduce an arbitrary identifier to `[A-Za-z0-9_-]`, never empty.
pub fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect();
    if cleaned.is_empty() {
        "job".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspaces_are_distinct_for_same_project() {
        let root = tempfile::tempdir().unwrap();
        let a = JobWorkspace::create(root.path(), "proj").unwrap();
        let b = JobWorkspace::create(root.path(), "proj").unwrap();
        assert_ne!(a.root(), b.root());
        assert!(a.assets_dir().is_dir());
        assert!(b.normalized_dir().is_dir());
    }

    #[test]
    fn test_cleanup_removes_tree() {
        let root = tempfile::tempdir().unwrap();
        let ws = JobWorkspace::create(root.path(), "proj").unwrap();
        std::fs::write(ws.scenes_dir().join("x.png"), b"x").unwrap();
        ws.cleanup();
        assert!(!ws.root().exists());
    }

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component("my project/ü#1"), "my_project___1");
        assert_eq!(sanitize_component(""), "job");
    }
}
