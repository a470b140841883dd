//! Job-scoped scratch directories.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::MediaResult;

/// Scratch directory holding a job's frames and audio files.
///
/// Call [`JobWorkspace::cleanup`] on every exit path; dropping without it
/// falls back to a blocking removal.
#[derive(Debug)]
pub struct JobWorkspace {
    path: PathBuf,
    removed: bool,
}

impl JobWorkspace {
    /// Create `<base_dir>/<job_id>_<random>`.
    pub async fn create(base_dir: impl AsRef<Path>, job_id: &str) -> MediaResult<Self> {
        let dir_name = format!("{}_{}", sanitize(job_id), uuid::Uuid::new_v4().simple());
        let path = base_dir.as_ref().join(dir_name);

        tokio::fs::create_dir_all(&path).await?;
        debug!("Created job workspace {}", path.display());

        Ok(Self {
            path,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory and everything in it.
    pub async fn cleanup(mut self) {
        self.removed = true;
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => debug!("Removed job workspace {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove job workspace {}: {}", self.path.display(), e),
        }
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        if !self.removed {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }
}

/// Keep job ids from escaping the base directory.
fn sanitize(job_id: &str) -> String {
    job_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
