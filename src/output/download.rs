use std::path::{Path, PathBuf};

use super::paths::free_path;
use super::PersistError;
use crate::capture::MediaBlob;

/// Hands the recording out as a plain file with a fixed, generic name.
#[derive(Debug, Clone)]
pub struct DownloadSink {
    dir: PathBuf,
    file_name: String,
    allowed: bool,
}

impl DownloadSink {
    pub fn new(dir: impl Into<PathBuf>, file_name: impl Into<String>, allowed: bool) -> Self {
        Self {
            dir: dir.into(),
            file_name: file_name.into(),
            allowed,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The suggested name is only logged: downloads always use the fixed name,
    /// with a ` (n)` suffix instead of overwriting an earlier download.
    pub async fn persist(&self, blob: &MediaBlob, suggested_name: &str) -> Result<PathBuf, PersistError> {
        if !self.allowed {
            return Err(PersistError::PersistFailed(
                "programmatic downloads are blocked on this platform".to_string(),
            ));
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| PersistError::PersistFailed(format!("create {:?}: {}", self.dir, e)))?;

        let path = free_path(&self.dir, &self.file_name).await;
        tokio::fs::write(&path, &blob.bytes)
            .await
            .map_err(|e| PersistError::PersistFailed(format!("write {:?}: {}", path, e)))?;

        log::info!(
            "Recording downloaded to {:?} ({} bytes, take {})",
            path,
            blob.len(),
            suggested_name
        );
        Ok(path)
    }
}
