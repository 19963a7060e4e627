use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::error::BoxError;
use crate::upload::tree::UploadEntry;
use crate::worker::{work_fn, WorkFn};

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Failed to create directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy {from} to {to}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is not a {1}")]
    WrongKind(PathBuf, &'static str),
}

/// Upload target backed by a local directory.
///
/// Directories are recreated under the destination and files are copied into
/// them. A file whose parent directory failed to upload fails in turn.
#[derive(Debug, Clone)]
pub struct LocalUploader {
    destination: PathBuf,
}

impl LocalUploader {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn target_path(&self, entry: &UploadEntry) -> PathBuf {
        self.destination.join(&entry.relative_path)
    }

    pub async fn create_directory(&self, entry: &UploadEntry) -> Result<(), UploadError> {
        if entry.is_file {
            return Err(UploadError::WrongKind(entry.full_path.clone(), "directory"));
        }
        let path = self.target_path(entry);
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|source| UploadError::CreateDir { path, source })
    }

    pub async fn upload_file(&self, entry: &UploadEntry) -> Result<u64, UploadError> {
        if !entry.is_file {
            return Err(UploadError::WrongKind(entry.full_path.clone(), "file"));
        }
        let to = self.target_path(entry);
        tokio::fs::copy(&entry.full_path, &to)
            .await
            .map_err(|source| UploadError::Copy {
                from: entry.full_path.clone(),
                to,
                source,
            })
    }

    /// Work function for directory jobs.
    pub fn blocking_work(self: &Arc<Self>) -> WorkFn<UploadEntry> {
        let uploader = Arc::clone(self);
        work_fn(move |entry: Arc<UploadEntry>| {
            let uploader = Arc::clone(&uploader);
            async move {
                uploader
                    .create_directory(&entry)
                    .await
                    .map_err(|e| Box::new(e) as BoxError)
            }
        })
    }

    /// Work function for file jobs.
    pub fn non_blocking_work(self: &Arc<Self>) -> WorkFn<UploadEntry> {
        let uploader = Arc::clone(self);
        work_fn(move |entry: Arc<UploadEntry>| {
            let uploader = Arc::clone(&uploader);
            async move {
                let bytes = uploader
                    .upload_file(&entry)
                    .await
                    .map_err(|e| Box::new(e) as BoxError)?;
                tracing::debug!(path = %entry.relative_path.display(), bytes, "File uploaded");
                Ok::<(), BoxError>(())
            }
        })
    }
}
