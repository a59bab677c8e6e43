//! Recording output
//!
//! A finished recording goes to exactly one of two places: a plain download
//! or the device gallery. The variant is picked once per session.

mod download;
mod gallery;
mod paths;

pub use download::DownloadSink;
pub use gallery::{NativeGallerySink, WriteFileRequest, EXTERNAL_STORAGE};
pub use paths::{recording_file_name, sanitize_title, unix_millis};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::capture::MediaBlob;
use crate::settings::AppSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputTarget {
    Download,
    NativeGallery,
}

/// Errors that can occur while persisting a recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistError {
    /// The download could not be produced.
    PersistFailed(String),
    /// Writing into the device media directory failed (permission, space).
    FilesystemWriteError(String),
}

impl std::fmt::Display for PersistError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistError::PersistFailed(e) => write!(f, "Failed to save recording: {}", e),
            PersistError::FilesystemWriteError(e) => {
                write!(f, "Failed to write recording to the gallery: {}", e)
            }
        }
    }
}

impl std::error::Error for PersistError {}

#[derive(Debug, Clone)]
pub enum OutputSink {
    Download(DownloadSink),
    NativeGallery(NativeGallerySink),
}

impl OutputSink {
    pub fn target(&self) -> OutputTarget {
        match self {
            OutputSink::Download(_) => OutputTarget::Download,
            OutputSink::NativeGallery(_) => OutputTarget::NativeGallery,
        }
    }

    /// Store `blob` and return where it ended up.
    pub async fn persist(&self, blob: &MediaBlob, suggested_name: &str) -> Result<PathBuf, PersistError> {
        match self {
            OutputSink::Download(sink) => sink.persist(blob, suggested_name).await,
            OutputSink::NativeGallery(sink) => sink.persist(blob, suggested_name).await,
        }
    }
}

/// Both configured sinks; the controller picks one per session.
#[derive(Debug, Clone)]
pub struct OutputSinks {
    pub download: DownloadSink,
    pub gallery: NativeGallerySink,
}

impl OutputSinks {
    pub fn from_settings(settings: &AppSettings) -> Self {
        let downloads_dir = settings.downloads_dir.clone().unwrap_or_else(|| {
            dirs::download_dir()
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from("."))
        });
        let gallery_root = settings
            .gallery_root
            .clone()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")));

        Self {
            download: DownloadSink::new(
                downloads_dir,
                settings.download_file_name.clone(),
                settings.allow_downloads,
            ),
            gallery: NativeGallerySink::new(gallery_root, settings.gallery_album.clone()),
        }
    }

    pub fn select(&self, target: OutputTarget) -> OutputSink {
        match target {
            OutputTarget::Download => OutputSink::Download(self.download.clone()),
            OutputTarget::NativeGallery => OutputSink::NativeGallery(self.gallery.clone()),
        }
    }
}
