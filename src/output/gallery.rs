//! Native gallery output
//!
//! Native filesystem bridges only carry text, so the blob travels base64
//! encoded inside a `WriteFileRequest`. The request path is relative to the
//! external storage root, e.g. `DCIM/Teleprompt/Intro-1700000000000.webm`.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

use super::paths::free_path;
use super::PersistError;
use crate::capture::MediaBlob;

pub const EXTERNAL_STORAGE: &str = "EXTERNAL_STORAGE";

/// Bridge payload for a single file write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteFileRequest {
    pub path: String,
    /// Base64, no data-URL prefix.
    pub data: String,
    pub directory: String,
}

#[derive(Debug, Clone)]
pub struct NativeGallerySink {
    root: PathBuf,
    album: String,
}

impl NativeGallerySink {
    pub fn new(root: impl Into<PathBuf>, album: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            album: album.into(),
        }
    }

    pub fn album_dir(&self) -> PathBuf {
        self.root.join(&self.album)
    }

    pub fn encode_request(&self, blob: &MediaBlob, file_name: &str) -> WriteFileRequest {
        WriteFileRequest {
            path: format!("{}/{}", self.album.trim_end_matches('/'), file_name),
            data: STANDARD.encode(&blob.bytes),
            directory: EXTERNAL_STORAGE.to_string(),
        }
    }

    /// Write the recording into the album. Failures are reported, never retried.
    pub async fn persist(&self, blob: &MediaBlob, file_name: &str) -> Result<PathBuf, PersistError> {
        let request = self.encode_request(blob, file_name);
        let path = self.write_request(&request).await?;
        log::info!("Recording saved to gallery: {:?} ({} bytes)", path, blob.len());
        Ok(path)
    }

    /// Execute a bridge request against the storage root.
    pub async fn write_request(&self, request: &WriteFileRequest) -> Result<PathBuf, PersistError> {
        if request.directory != EXTERNAL_STORAGE {
            return Err(PersistError::FilesystemWriteError(format!(
                "unsupported directory {}",
                request.directory
            )));
        }

        let relative = Path::new(&request.path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes || relative.file_name().is_none() {
            return Err(PersistError::FilesystemWriteError(format!(
                "invalid path {}",
                request.path
            )));
        }

        let bytes = STANDARD
            .decode(&request.data)
            .map_err(|e| PersistError::FilesystemWriteError(format!("bad payload: {}", e)))?;

        let requested = self.root.join(relative);
        let (Some(parent), Some(file_name)) = (requested.parent(), requested.file_name()) else {
            return Err(PersistError::FilesystemWriteError(format!(
                "invalid path {}",
                request.path
            )));
        };
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            PersistError::FilesystemWriteError(format!("create {:?}: {}", parent, e))
        })?;

        // Same-millisecond takes of one title must not replace each other.
        let path = free_path(parent, &file_name.to_string_lossy()).await;
        if path != requested {
            log::warn!("{:?} already exists, saving as {:?}", requested, path);
        }

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| PersistError::FilesystemWriteError(format!("write {:?}: {}", path, e)))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ContainerFormat;

    fn blob(bytes: &[u8]) -> MediaBlob {
        MediaBlob {
            bytes: bytes.to_vec(),
            container: ContainerFormat::WebM,
        }
    }

    #[test]
    fn request_carries_base64_without_prefix() {
        let sink = NativeGallerySink::new("/sdcard", "DCIM/Teleprompt");
        let request = sink.encode_request(&blob(b"hello"), "Intro-1.webm");

        assert_eq!(request.path, "DCIM/Teleprompt/Intro-1.webm");
        assert_eq!(request.data, "aGVsbG8=");
        assert_eq!(request.directory, EXTERNAL_STORAGE);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["directory"], "EXTERNAL_STORAGE");
    }

    #[tokio::test]
    async fn writes_into_the_album_below_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let sink = NativeGallerySink::new(dir.path(), "DCIM/Teleprompt");

        let path = sink.persist(&blob(b"video"), "Intro-42.webm").await.unwrap();

        assert_eq!(path, dir.path().join("DCIM/Teleprompt/Intro-42.webm"));
        assert_eq!(std::fs::read(&path).unwrap(), b"video");
    }

    #[tokio::test]
    async fn existing_recordings_are_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let sink = NativeGallerySink::new(dir.path(), "DCIM/Teleprompt");

        let first = sink.persist(&blob(b"first"), "Intro-42.webm").await.unwrap();
        let second = sink.persist(&blob(b"second"), "Intro-42.webm").await.unwrap();

        assert_eq!(second, dir.path().join("DCIM/Teleprompt/Intro-42 (1).webm"));
        assert_eq!(std::fs::read(&first).unwrap(), b"first");
        assert_eq!(std::fs::read(&second).unwrap(), b"second");
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sink = NativeGallerySink::new(dir.path(), "DCIM/Teleprompt");
        let request = WriteFileRequest {
            path: "../outside.webm".to_string(),
            data: STANDARD.encode(b"x"),
            directory: EXTERNAL_STORAGE.to_string(),
        };
        assert!(matches!(
            sink.write_request(&request).await,
            Err(PersistError::FilesystemWriteError(_))
        ));
    }

    #[tokio::test]
    async fn write_failures_are_filesystem_errors() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("DCIM");
        std::fs::write(&blocker, b"").unwrap();
        let sink = NativeGallerySink::new(dir.path(), "DCIM/Teleprompt");

        let err = sink.persist(&blob(b"x"), "t-1.webm").await.unwrap_err();
        assert!(matches!(err, PersistError::FilesystemWriteError(_)));
    }
}
