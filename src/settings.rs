use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::platform::Platform;

const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    /// Initial auto-scroll speed in display units per second.
    pub scroll_speed: f64,

    /// Interval between scroll ticks.
    pub tick_interval_ms: u64,

    /// Fixed file name used when a recording is handed out as a download.
    pub download_file_name: String,

    /// Where downloads land. `None` uses the user's download directory.
    pub downloads_dir: Option<PathBuf>,

    /// Root of the device-visible external storage. `None` uses the home directory.
    pub gallery_root: Option<PathBuf>,

    /// Album path below `gallery_root` that native recordings are written to.
    pub gallery_album: String,

    /// Some hosts block programmatic downloads; downloads then fail instead of silently vanishing.
    pub allow_downloads: bool,

    /// Forces the platform answer instead of detecting it from the build target.
    pub platform_override: Option<Platform>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            scroll_speed: 20.0,
            tick_interval_ms: 50,
            download_file_name: "teleprompt-recording.webm".to_string(),
            downloads_dir: None,
            gallery_root: None,
            gallery_album: "DCIM/Teleprompt".to_string(),
            allow_downloads: true,
            platform_override: None,
        }
    }
}

/// Default location: <config dir>/teleprompt/settings.json
pub fn settings_path() -> Result<PathBuf, String> {
    let dir = dirs::config_dir().ok_or_else(|| "Could not determine config directory".to_string())?;
    Ok(dir.join("teleprompt").join(SETTINGS_FILE_NAME))
}

pub fn load_settings(path: &Path) -> AppSettings {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<AppSettings>(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Settings: failed to parse {:?}: {}", path, e);
                AppSettings::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppSettings::default(),
        Err(e) => {
            log::warn!("Settings: failed to read {:?}: {}", path, e);
            AppSettings::default()
        }
    }
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> Result<(), String> {
    let contents =
        serde_json::to_string_pretty(settings).map_err(|e| format!("Serialize settings: {}", e))?;
    write_atomically(path, &contents)
}

/// Write a file by writing a sibling temp file and renaming it over the target,
/// so readers never observe a half-written file.
pub(crate) fn write_atomically(path: &Path, contents: &str) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create directory {:?}: {}", parent, e))?;
    }

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, contents)
        .map_err(|e| format!("Write temp file {:?}: {}", tmp_path, e))?;

    // On Windows, rename fails if the destination exists.
    if cfg!(windows) && path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(format!("Remove existing file {:?}: {}", path, e));
            }
        }
    }

    std::fs::rename(&tmp_path, path)
        .map_err(|e| format!("Rename temp file {:?} to {:?}: {}", tmp_path, path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings(&dir.path().join("nope.json"));
        assert_eq!(settings, AppSettings::default());
        assert_eq!(settings.tick_interval_ms, 50);
    }

    #[test]
    fn corrupt_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_settings(&path), AppSettings::default());
    }

    #[test]
    fn save_then_load_keeps_values_and_fills_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE_NAME);
        let settings = AppSettings {
            scroll_speed: 35.5,
            platform_override: Some(Platform::Android),
            ..AppSettings::default()
        };
        save_settings(&path, &settings).unwrap();
        assert_eq!(load_settings(&path), settings);
        assert!(!path.with_extension("json.tmp").exists());

        std::fs::write(&path, r#"{ "scroll_speed": 12.0 }"#).unwrap();
        let partial = load_settings(&path);
        assert_eq!(partial.scroll_speed, 12.0);
        assert_eq!(partial.gallery_album, "DCIM/Teleprompt");
    }
}
