//! Staged copies of source videos.
//!
//! A job deletes its file once the upload attempt ends, so the CLI uploads a
//! copy kept in a staging directory. The job only removes that copy after
//! reaching Upload; copies left behind by jobs that stopped earlier are
//! removed here.

use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::StagingError;
use crate::job::UploadJob;

pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// `staging/` next to the job database.
    pub fn beside(database_path: &Path) -> Self {
        let dir = database_path
            .parent()
            .map(|p| p.join("staging"))
            .unwrap_or_else(|| PathBuf::from("staging"));
        Self::new(dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copies `source` into the staging directory under a unique name.
    pub fn stage(&self, source: &Path) -> Result<PathBuf, StagingError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| StagingError::CreateDirectory {
            path: self.dir.clone(),
            source: e,
        })?;

        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "video.mp4".to_string());
        let staged = self.dir.join(format!("{}-{}", uuid::Uuid::new_v4(), name));

        std::fs::copy(source, &staged).map_err(|e| StagingError::CopyFile {
            from: source.to_path_buf(),
            to: staged.clone(),
            source: e,
        })?;

        debug!("Staged {} as {}", source.display(), staged.display());
        Ok(staged)
    }

    pub fn owns(&self, path: &Path) -> bool {
        path.parent() == Some(self.dir.as_path())
    }

    /// Removes the staged copy behind a job that no longer needs it.
    ///
    /// Jobs still running and files outside the staging directory are left
    /// alone. Returns whether a file was removed.
    pub fn discard(&self, job: &UploadJob) -> bool {
        if !job.is_completed() || !self.owns(job.file()) {
            return false;
        }

        match std::fs::remove_file(job.file()) {
            Ok(()) => {
                debug!("Removed staged copy {}", job.file().display());
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!(
                    "Failed to remove staged copy {}: {}",
                    job.file().display(),
                    e
                );
                false
            }
        }
    }
}
