use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};
use uuid::Uuid;

/// Per-job scratch directory under the configured temp root.
///
/// `cleanup` removes the directory off the runtime threads and logs failures.
/// Dropping the workspace without it still removes the directory, which
/// covers unwinding out of a job.
#[derive(Debug)]
pub struct TempWorkspace {
    dir: TempDir,
}

impl TempWorkspace {
    pub async fn create(root: &Path, job_id: Uuid) -> Result<Self> {
        tokio::fs::create_dir_all(root)
            .await
            .with_context(|| format!("failed to create temp root {}", root.display()))?;

        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", job_id))
            .tempdir_in(root)
            .with_context(|| format!("failed to create workspace for job {}", job_id))?;

        debug!(job_id = %job_id, path = %dir.path().display(), "workspace created");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Create (if needed) and return a named subdirectory.
    pub async fn subdir(&self, name: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        tokio::fs::create_dir_all(&path)
            .await
            .with_context(|| format!("failed to create {}", path.display()))?;
        Ok(path)
    }

    pub async fn cleanup(self) {
        let path = self.dir.path().to_path_buf();
        match tokio::task::spawn_blocking(move || self.dir.close()).await {
            Ok(Ok(())) => debug!(path = %path.display(), "workspace removed"),
            Ok(Err(e)) => warn!(path = %path.display(), error = %e, "failed to remove workspace"),
            Err(e) => warn!(path = %path.display(), error = %e, "workspace cleanup task failed"),
        }
    }
}
