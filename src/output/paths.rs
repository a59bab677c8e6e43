//! File naming for persisted recordings
//!
//! Native recordings are named `<title>-<unix ms>.<ext>` so repeated takes of
//! the same message never collide.

use std::path::{Path, PathBuf};

use crate::capture::ContainerFormat;

/// Current Unix time in milliseconds.
pub fn unix_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Make a message title usable as a file name component.
///
/// Path separators, reserved characters and control characters become `_`;
/// an empty result falls back to `recording`.
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        "recording".to_string()
    } else {
        cleaned
    }
}

pub fn recording_file_name(title: &str, unix_ms: i64, container: ContainerFormat) -> String {
    format!("{}-{}.{}", sanitize_title(title), unix_ms, container.extension())
}

/// `dir/file_name`, or the first free `stem (n).ext` next to it. Existing
/// files are never overwritten.
pub(crate) async fn free_path(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !exists(&candidate).await {
        return candidate;
    }

    let name = Path::new(file_name);
    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string());
    let ext = name.extension().map(|e| e.to_string_lossy().to_string());

    let mut n = 1;
    loop {
        let numbered = match &ext {
            Some(ext) => format!("{} ({}).{}", stem, n, ext),
            None => format!("{} ({})", stem, n),
        };
        let candidate = dir.join(numbered);
        if !exists(&candidate).await {
            return candidate;
        }
        n += 1;
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}
