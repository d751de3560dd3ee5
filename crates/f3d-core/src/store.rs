use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::job::JobId;

/// Filesystem-backed artifact storage. Every job owns one directory under
/// the store root; files are only ever created and deleted as part of their
/// job's lifecycle, never individually.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn job_dir(&self, job_id: &JobId) -> PathBuf {
        self.root.join(job_id.to_string())
    }

    pub async fn allocate_job_dir(&self, job_id: &JobId) -> Result<PathBuf> {
        let dir = self.job_dir(job_id);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    pub async fn write_artifact(
        &self,
        job_id: &JobId,
        filename: &str,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        check_filename(filename)?;
        let path = self.allocate_job_dir(job_id).await?.join(filename);
        tokio::fs::write(&path, bytes).await?;
        debug!(job_id = %job_id, filename, size = bytes.len(), "wrote artifact");
        Ok(path)
    }

    /// Resolve an artifact file to its path. Fails with `NotFound` for an
    /// unknown job directory, a missing file, or any filename that is not a
    /// plain file name (path traversal). Callers additionally check the
    /// filename against the job's recorded artifact set.
    pub async fn resolve(&self, job_id: &JobId, filename: &str) -> Result<PathBuf> {
        check_filename(filename)
            .map_err(|_| Error::not_found(format!("file {filename} for job {job_id}")))?;
        let path = self.job_dir(job_id).join(filename);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            _ => Err(Error::not_found(format!("file {filename} for job {job_id}"))),
        }
    }

    /// Delete a job's entire directory tree. Idempotent: deleting an absent
    /// directory is not an error.
    pub async fn delete_job_dir(&self, job_id: &JobId) -> Result<()> {
        let dir = self.job_dir(job_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// A valid artifact filename is a single normal path component. Separators,
/// `..`, and empty names are rejected before touching the filesystem.
fn check_filename(filename: &str) -> Result<()> {
    if filename.is_empty() || filename.contains('/') || filename.contains('\\') {
        return Err(Error::validation(format!("invalid filename: {filename:?}")));
    }
    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(Error::validation(format!("invalid filename: {filename:?}"))),
    }
}
